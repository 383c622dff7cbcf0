// Command handlers. Results go to stdout as JSON; diagnostics go to the log.

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use challenge_store::db::SqliteStore;
use challenge_store::repository::Mutation;
use challenge_store::schema::{EntrySchema, GameEntry, PenaltyEntry};
use challenge_store::selection::{select_weighted, spin};
use challenge_store::store::LocalStore;
use challenge_store::sync::{SyncAdapter, SyncTransport};

use crate::cli::{CommonCommand, GameEntryCommand, PenaltyEntryCommand, SyncCommand, TabCommand};

type Store<E> = LocalStore<E, SqliteStore>;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(mutation: Mutation, what: &str) {
    match mutation {
        Mutation::Changed => println!("{what}"),
        Mutation::Unchanged => println!("nothing to do"),
    }
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

// ---------------------------------------------------------------------------
// Shared commands
// ---------------------------------------------------------------------------

pub async fn run_common<E, T>(store: &Store<E>, sync: &SyncAdapter<T>, command: CommonCommand) -> anyhow::Result<()>
where
    E: EntrySchema,
    T: SyncTransport,
{
    match command {
        CommonCommand::Init => {
            // Opening the store already initialized and reconciled it.
            let tabs = store.tabs.list();
            let entries: usize = tabs.iter().map(|t| store.entries.list(&t.id).len()).sum();
            println!("{} tab(s), {} entr(ies)", tabs.len(), entries);
        }
        CommonCommand::Tabs { command } => run_tabs(store, sync, command).await?,
        CommonCommand::Summary { tab } => print_json(&store.summary(&tab))?,
        CommonCommand::Sync { command } => run_sync(store, sync, command).await?,
    }
    Ok(())
}

async fn run_tabs<E, T>(store: &Store<E>, sync: &SyncAdapter<T>, command: TabCommand) -> anyhow::Result<()>
where
    E: EntrySchema,
    T: SyncTransport,
{
    match command {
        TabCommand::List => print_json(&store.tabs.list())?,
        TabCommand::Add => print_json(&store.tabs.create_tab()?)?,
        TabCommand::Rename { id, name } => {
            store.tabs.rename_tab(&id, &name)?;
            println!("renamed {id}");
        }
        TabCommand::Delete { id, remote: true, yes } => {
            sync.delete_tab(store, &id, yes).await?;
            println!("deleted {id} on the server and locally");
        }
        TabCommand::Delete { id, remote: false, .. } => {
            report(store.tabs.delete_local(&id)?, &format!("deleted {id}"));
        }
    }
    Ok(())
}

async fn run_sync<E, T>(store: &Store<E>, sync: &SyncAdapter<T>, command: SyncCommand) -> anyhow::Result<()>
where
    E: EntrySchema,
    T: SyncTransport,
{
    match command {
        SyncCommand::Save { tab } => {
            if !store.tabs.contains(&tab) {
                bail!("tab `{tab}` does not exist");
            }
            let entries = store.entries.list(&tab);
            sync.save_tab(&tab, &store.tabs.name_of(&tab), &entries).await?;
            println!("saved {tab} ({} entries)", entries.len());
        }
        SyncCommand::Delete { tab, yes } => {
            sync.delete_tab(store, &tab, yes).await?;
            println!("deleted {tab} on the server and locally");
        }
        SyncCommand::LoadSaved => {
            let merged = sync.load_saved_tabs(store).await?;
            println!("merged {merged} saved tab(s)");
        }
        SyncCommand::LoadDefaults => {
            let count = sync.load_defaults(store).await?;
            println!("loaded {count} default entr(ies)");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

pub fn run_game_entries(store: &Store<GameEntry>, command: GameEntryCommand) -> anyhow::Result<()> {
    match command {
        GameEntryCommand::List { tab } => print_json(&store.entries.list(&tab))?,
        GameEntryCommand::Add { tab, fields } => print_json(&store.add_new(&tab, fields.into())?)?,
        GameEntryCommand::Update { tab, id, fields } => {
            report(store.edit(&tab, &id, fields.into())?, &format!("updated {id}"));
        }
        GameEntryCommand::Remove { tab, id } => {
            report(store.entries.remove(&tab, &id)?, &format!("removed {id}"));
        }
    }
    Ok(())
}

pub fn run_penalty_entries(store: &Store<PenaltyEntry>, command: PenaltyEntryCommand) -> anyhow::Result<()> {
    match command {
        PenaltyEntryCommand::List { tab } => print_json(&store.entries.list(&tab))?,
        PenaltyEntryCommand::Add { tab, fields } => print_json(&store.add_new(&tab, fields.into())?)?,
        PenaltyEntryCommand::Update { tab, id, fields } => {
            report(store.edit(&tab, &id, fields.into())?, &format!("updated {id}"));
        }
        PenaltyEntryCommand::Remove { tab, id } => {
            report(store.entries.remove(&tab, &id)?, &format!("removed {id}"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Draws
// ---------------------------------------------------------------------------

pub fn draw_game(store: &Store<GameEntry>, tab: &str, seed: Option<u64>) -> anyhow::Result<()> {
    let games = store.entries.list(tab);
    let game = select_weighted(&games, &mut rng(seed))
        .with_context(|| format!("no game in `{tab}` has a positive weight"))?;
    info!(tab, game = %game.game, "game drawn");
    print_json(game)
}

#[derive(Serialize)]
struct SpinResult<'a> {
    player: &'a str,
    penalty: &'a PenaltyEntry,
}

pub fn spin_wheel(store: &Store<PenaltyEntry>, tab: &str, players: &[String], seed: Option<u64>) -> anyhow::Result<()> {
    let penalties = store.entries.list(tab);
    let outcome = spin(players, &penalties, &mut rng(seed))
        .with_context(|| format!("need at least one named player and one penalty with probability > 0 in `{tab}`"))?;
    info!(tab, player = outcome.player, penalty = %outcome.penalty.name, "wheel spun");
    print_json(&SpinResult {
        player: outcome.player,
        penalty: outcome.penalty,
    })
}
