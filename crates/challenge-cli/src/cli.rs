// Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use challenge_store::schema::{GameInput, PenaltyInput, DEFAULT_TAB_ID};

#[derive(Parser)]
#[command(name = "challenge", version, about = "Local game and penalty configuration store")]
pub struct Cli {
    /// Directory holding `config/`, logs and the database. Missing config
    /// files are written from built-in defaults.
    #[arg(long, global = true, env = "CHALLENGE_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Game tabs and entries
    Games {
        #[command(subcommand)]
        command: GameCommand,
    },
    /// Penalty tabs and entries
    Penalties {
        #[command(subcommand)]
        command: PenaltyCommand,
    },
    /// Spin the penalty wheel: pick a player, then a weighted penalty
    Spin {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        #[arg(long = "player", required = true)]
        players: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum GameCommand {
    #[command(flatten)]
    Common(CommonCommand),
    /// Add, edit, list or remove games
    Entries {
        #[command(subcommand)]
        command: GameEntryCommand,
    },
    /// Draw one game from a tab, weighted by each entry's weight
    Draw {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum PenaltyCommand {
    #[command(flatten)]
    Common(CommonCommand),
    /// Add, edit, list or remove penalties
    Entries {
        #[command(subcommand)]
        command: PenaltyEntryCommand,
    },
}

/// Commands shared by both domains.
#[derive(Subcommand)]
pub enum CommonCommand {
    /// Create the local documents if missing and report their state
    Init,
    Tabs {
        #[command(subcommand)]
        command: TabCommand,
    },
    /// Grouped view of one tab
    Summary {
        #[arg(default_value = DEFAULT_TAB_ID)]
        tab: String,
    },
    /// Exchange tabs with the server
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
}

#[derive(Subcommand)]
pub enum TabCommand {
    List,
    /// Create a new tab with a generated id and name
    Add,
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
        /// Also delete the server copy
        #[arg(long)]
        remote: bool,
        /// Confirm a remote delete
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommand {
    /// Upload one tab
    Save { tab: String },
    /// Delete a tab on the server and locally
    Delete {
        tab: String,
        #[arg(long)]
        yes: bool,
    },
    /// Merge every server-saved tab into local storage
    LoadSaved,
    /// Replace the default tab with the server's defaults
    LoadDefaults,
}

#[derive(Subcommand)]
pub enum GameEntryCommand {
    List {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
    },
    Add {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        #[command(flatten)]
        fields: GameFields,
    },
    Update {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        id: String,
        #[command(flatten)]
        fields: GameFields,
    },
    Remove {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PenaltyEntryCommand {
    List {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
    },
    Add {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        #[command(flatten)]
        fields: PenaltyFields,
    },
    Update {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        id: String,
        #[command(flatten)]
        fields: PenaltyFields,
    },
    Remove {
        #[arg(long, default_value = DEFAULT_TAB_ID)]
        tab: String,
        id: String,
    },
}

#[derive(Args)]
pub struct GameFields {
    #[arg(long)]
    pub game: String,
    #[arg(long)]
    pub mode: String,
    /// 0 to 10, rounded to one decimal
    #[arg(long)]
    pub difficulty: f64,
    /// 1 to 99
    #[arg(long)]
    pub players: u32,
    /// Relative draw weight (default 1)
    #[arg(long)]
    pub weight: Option<f64>,
}

impl From<GameFields> for GameInput {
    fn from(f: GameFields) -> Self {
        GameInput {
            game: f.game,
            game_mode: f.mode,
            difficulty: f.difficulty,
            number_of_players: f.players,
            weight: f.weight,
        }
    }
}

#[derive(Args)]
pub struct PenaltyFields {
    #[arg(long)]
    pub name: String,
    /// 0 to 1
    #[arg(long)]
    pub probability: f64,
    #[arg(long, default_value = "")]
    pub description: String,
}

impl From<PenaltyFields> for PenaltyInput {
    fn from(f: PenaltyFields) -> Self {
        PenaltyInput {
            name: f.name,
            probability: f.probability,
            description: f.description,
        }
    }
}
