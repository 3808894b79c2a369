//! v1 cross-boundary contracts for the RTP drift kernel, API, and persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod seed_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// One logical drift step covers three minutes of wall-clock time.
pub const STEP_MS: u64 = 3 * 60 * 1000;

/// Composite identifier of one simulated value stream: `provider|code`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameKey {
    pub provider_code: String,
    pub code: String,
}

impl GameKey {
    pub fn new(provider_code: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            provider_code: provider_code.into(),
            code: code.into(),
        }
    }

    pub fn for_game(game: &CatalogGame) -> Self {
        Self::new(game.provider_code.clone(), game.code.clone())
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.provider_code, self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameKeyParseError {
    pub raw: String,
}

impl fmt::Display for GameKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game key is not provider|code: {}", self.raw)
    }
}

impl std::error::Error for GameKeyParseError {}

impl FromStr for GameKey {
    type Err = GameKeyParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (provider_code, code) = raw.split_once('|').ok_or_else(|| GameKeyParseError {
            raw: raw.to_string(),
        })?;
        if provider_code.is_empty() || code.is_empty() {
            return Err(GameKeyParseError {
                raw: raw.to_string(),
            });
        }
        Ok(Self::new(provider_code, code))
    }
}

// Serialized as the pipe form so snapshot maps keep `"PP|g1"` keys.
impl Serialize for GameKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GameKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<GameKey>().map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DriftMode {
    Normal,
    Recovery,
}

/// Per-key drift record. Field spellings match the widget snapshot files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftState {
    pub value: f64,
    pub mode: DriftMode,
    pub last_advanced_at: u64,
}

impl fmt::Display for DriftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value={:.2} mode={:?} last_advanced_at={}",
            self.value, self.mode, self.last_advanced_at
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub schema_version: String,
    #[serde(with = "seed_string")]
    pub seed: u64,
    pub step_ms: u64,
    /// Upper bound on transitions replayed per key in one advance call.
    pub max_replay_steps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: 1337,
            step_ms: STEP_MS,
            // 24 hours of three-minute steps.
            max_replay_steps: 480,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderInfo {
    pub code: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogGame {
    pub provider_code: String,
    pub provider_name: String,
    pub code: String,
    pub name: String,
    pub thumb: String,
}

/// Catalog of one base origin, as supplied by the upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogData {
    pub updated: String,
    pub base_url: String,
    pub providers: Vec<ProviderInfo>,
    pub games: Vec<CatalogGame>,
}

/// Catalog record with the simulated metric merged in. `rtp` is null when no
/// drift state exists for the key yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameWithRtp {
    #[serde(flatten)]
    pub game: CatalogGame,
    pub rtp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RtpReport {
    pub schema_version: String,
    pub updated: String,
    pub base_url: String,
    pub providers: Vec<ProviderInfo>,
    pub games: Vec<GameWithRtp>,
}

/// Persisted-variant snapshot: base origin -> game key -> drift state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub namespaces: BTreeMap<String, BTreeMap<GameKey, DriftState>>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION_V1.to_string()
}

impl EngineSnapshot {
    pub fn new(namespaces: BTreeMap<String, BTreeMap<GameKey, DriftState>>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            namespaces,
        }
    }
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BaseNotFound,
    CatalogUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
