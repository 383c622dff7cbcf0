// Entry schemas and domain descriptors for games and penalties.

use std::fmt;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Id of the permanent tab every domain starts with.
pub const DEFAULT_TAB_ID: &str = "default";

/// Display name of the permanent tab.
pub const DEFAULT_TAB_NAME: &str = "Default";

pub const MIN_DIFFICULTY: f64 = 0.0;
pub const MAX_DIFFICULTY: f64 = 10.0;
pub const MIN_PLAYERS: u32 = 1;
pub const MAX_PLAYERS: u32 = 99;
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Largest sequence number a generated tab id may carry. Ids with a larger
/// suffix are treated as custom ids and do not seed the counter.
pub const MAX_TAB_SEQ: u64 = u32::MAX as u64;

// ---------------------------------------------------------------------------
// Domain descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainKind {
    Games,
    Penalties,
}

impl DomainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainKind::Games => "games",
            DomainKind::Penalties => "penalties",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one configuration domain: where its documents live,
/// how its generated tab ids look, and how its entries are named on the wire.
#[derive(Debug)]
pub struct DomainSpec {
    pub kind: DomainKind,
    /// Human label used in generated tab names ("Game Tab 3").
    pub label: &'static str,
    /// Prefix of generated tab ids (`<prefix>-<N>`).
    pub tab_prefix: &'static str,
    /// Storage key of the tab metadata document.
    pub tabs_key: &'static str,
    /// Storage key of the entry lists document.
    pub entries_key: &'static str,
    /// Field carrying the entry array in save requests and default loads.
    pub collection_field: &'static str,
    /// Field carrying the pre-serialized entry list in saved-tab responses.
    pub saved_json_field: &'static str,
    /// Local field name -> server field name.
    pub field_map: &'static [(&'static str, &'static str)],
}

pub static GAME_DOMAIN: DomainSpec = DomainSpec {
    kind: DomainKind::Games,
    label: "Game",
    tab_prefix: "tab",
    tabs_key: "localTabs",
    entries_key: "localEntries",
    collection_field: "entries",
    saved_json_field: "entries_json",
    field_map: &[
        ("game", "Spiel"),
        ("gameMode", "Spielmodus"),
        ("difficulty", "Schwierigkeit"),
        ("numberOfPlayers", "Spieleranzahl"),
    ],
};

pub static PENALTY_DOMAIN: DomainSpec = DomainSpec {
    kind: DomainKind::Penalties,
    label: "Penalty",
    tab_prefix: "penaltyTab",
    tabs_key: "localPenaltyTabs",
    entries_key: "localPenalties",
    collection_field: "penalties",
    saved_json_field: "penalties_json",
    field_map: &[],
};

impl DomainSpec {
    /// Build the generated tab id for sequence number `n`.
    pub fn tab_id(&self, n: u64) -> String {
        format!("{}-{n}", self.tab_prefix)
    }

    /// Extract `N` from a generated tab id of this domain. Returns `None` for
    /// the default tab, for ids that do not follow the `<prefix>-<N>` form and
    /// for `N` above [`MAX_TAB_SEQ`].
    pub fn parse_tab_id(&self, id: &str) -> Option<u64> {
        id.strip_prefix(self.tab_prefix)?
            .strip_prefix('-')?
            .parse()
            .ok()
            .filter(|n| *n <= MAX_TAB_SEQ)
    }

    /// Default display name for generated tab `n`.
    pub fn tab_name(&self, n: u64) -> String {
        format!("{} Tab {n}", self.label)
    }

    /// Name shown for a tab whose metadata is missing.
    pub fn fallback_tab_name(&self, id: &str) -> String {
        if id == DEFAULT_TAB_ID {
            return DEFAULT_TAB_NAME.to_string();
        }
        match self.parse_tab_id(id) {
            Some(n) => self.tab_name(n),
            None => id.to_string(),
        }
    }

    pub fn local_field<'a>(&self, server: &'a str) -> &'a str {
        self.field_map
            .iter()
            .find(|(_, s)| *s == server)
            .map(|(l, _)| *l)
            .unwrap_or(server)
    }

    /// Rename server-side keys of a wire object to their local names. Keys
    /// without a mapping pass through unchanged.
    pub fn translate_from_server(&self, object: Map<String, Value>) -> Map<String, Value> {
        object
            .into_iter()
            .map(|(k, v)| (self.local_field(&k).to_string(), v))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("`{field}` is required")]
    Missing { field: &'static str },

    #[error("`{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("`{field}` must be a finite number")]
    NotFinite { field: &'static str },

    #[error("`{field}` cannot be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(trimmed.to_string())
}

fn require_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(value)
}

/// Round to one decimal place, the precision difficulties are entered with.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// EntrySchema
// ---------------------------------------------------------------------------

/// A configuration record that can live in a tab. Both domains implement
/// this, and every store, view and sync operation is generic over it.
pub trait EntrySchema: Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq {
    /// Raw user input accepted by [`EntrySchema::build`].
    type Input;

    fn domain() -> &'static DomainSpec;

    /// The single validating factory. Trims text, enforces numeric ranges
    /// and required fields, and stamps the id and owning tab name.
    fn build(input: Self::Input, id: String, tab_name: &str) -> Result<Self, ValidationError>;

    /// Re-check an entry that arrived through deserialization.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Bring a deserialized entry to the precision `build` would produce.
    fn normalize(&mut self) {}

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    /// Grouping name (`game` or `name`).
    fn name(&self) -> &str;
    fn tab_name(&self) -> &str;
    fn set_tab_name(&mut self, tab_name: &str);

    fn mode(&self) -> Option<&str> {
        None
    }

    fn difficulty(&self) -> Option<f64> {
        None
    }

    fn player_count(&self) -> Option<u32> {
        None
    }
}

/// Generate a local entry id: millisecond timestamp plus a random base-36
/// suffix.
pub fn generate_entry_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{suffix}", chrono::Utc::now().timestamp_millis())
}

/// Ids have been seen as both JSON strings and numbers; keep them as strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "entry id must be a string or number, got {other}"
        ))),
    }
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

// ---------------------------------------------------------------------------
// Game entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub game: String,
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub number_of_players: u32,
    #[serde(default)]
    pub tab_name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameInput {
    pub game: String,
    pub game_mode: String,
    pub difficulty: f64,
    pub number_of_players: u32,
    pub weight: Option<f64>,
}

impl EntrySchema for GameEntry {
    type Input = GameInput;

    fn domain() -> &'static DomainSpec {
        &GAME_DOMAIN
    }

    fn build(input: GameInput, id: String, tab_name: &str) -> Result<Self, ValidationError> {
        let entry = GameEntry {
            id,
            game: require_text("game", &input.game)?,
            game_mode: require_text("gameMode", &input.game_mode)?,
            difficulty: round_tenths(input.difficulty),
            number_of_players: input.number_of_players,
            tab_name: tab_name.to_string(),
            weight: input.weight.unwrap_or(DEFAULT_WEIGHT),
        };
        entry.validate()?;
        Ok(entry)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("game", &self.game)?;
        require_text("gameMode", &self.game_mode)?;
        require_range("difficulty", self.difficulty, MIN_DIFFICULTY, MAX_DIFFICULTY)?;
        require_range(
            "numberOfPlayers",
            f64::from(self.number_of_players),
            f64::from(MIN_PLAYERS),
            f64::from(MAX_PLAYERS),
        )?;
        if !self.weight.is_finite() {
            return Err(ValidationError::NotFinite { field: "weight" });
        }
        if self.weight < 0.0 {
            return Err(ValidationError::Negative {
                field: "weight",
                value: self.weight,
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.difficulty = round_tenths(self.difficulty);
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.game
    }

    fn tab_name(&self) -> &str {
        &self.tab_name
    }

    fn set_tab_name(&mut self, tab_name: &str) {
        self.tab_name = tab_name.to_string();
    }

    fn mode(&self) -> Option<&str> {
        Some(&self.game_mode)
    }

    fn difficulty(&self) -> Option<f64> {
        Some(self.difficulty)
    }

    fn player_count(&self) -> Option<u32> {
        Some(self.number_of_players)
    }
}

// ---------------------------------------------------------------------------
// Penalty entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tab_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyInput {
    pub name: String,
    pub probability: f64,
    pub description: String,
}

impl EntrySchema for PenaltyEntry {
    type Input = PenaltyInput;

    fn domain() -> &'static DomainSpec {
        &PENALTY_DOMAIN
    }

    fn build(input: PenaltyInput, id: String, tab_name: &str) -> Result<Self, ValidationError> {
        let entry = PenaltyEntry {
            id,
            name: require_text("name", &input.name)?,
            probability: input.probability,
            description: input.description.trim().to_string(),
            tab_name: tab_name.to_string(),
        };
        entry.validate()?;
        Ok(entry)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_range("probability", self.probability, 0.0, 1.0)?;
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tab_name(&self) -> &str {
        &self.tab_name
    }

    fn set_tab_name(&mut self, tab_name: &str) {
        self.tab_name = tab_name.to_string();
    }
}
