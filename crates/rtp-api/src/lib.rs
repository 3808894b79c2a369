//! Widget facade over the drift engine: catalog fetch with last-known-good
//! fallback, rtp merge, and non-fatal JSON snapshot persistence.

mod catalog;
mod persistence;
mod server;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use rtp_contracts::{
    CatalogData, DriftState, GameKey, GameWithRtp, RtpReport, SCHEMA_VERSION_V1,
};
use rtp_core::RtpEngine;

pub use catalog::{default_providers, CatalogError, CatalogSource, StaticCatalog};
pub use persistence::{JsonSnapshotStore, PersistenceError};
pub use server::{serve, AppState, BaseRegistration, ServerError};

#[derive(Debug)]
pub enum RefreshError {
    CatalogUnavailable { base_url: String, reason: String },
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CatalogUnavailable { base_url, reason } => {
                write!(
                    f,
                    "no catalog for {base_url} and no cached copy: {reason}"
                )
            }
        }
    }
}

impl std::error::Error for RefreshError {}

/// Merge drift values into catalog records. Keys without state report null.
pub fn merge_rtp(
    catalog: &CatalogData,
    states: &BTreeMap<GameKey, DriftState>,
) -> Vec<GameWithRtp> {
    catalog
        .games
        .iter()
        .map(|game| GameWithRtp {
            game: game.clone(),
            rtp: states.get(&GameKey::for_game(game)).map(|state| state.value),
        })
        .collect()
}

/// Owns the engine plus the collaborator seams the presentation layer needs.
/// One instance per process; the server wraps it in a single mutex.
pub struct WidgetApi {
    engine: RtpEngine,
    catalog: Box<dyn CatalogSource>,
    last_good: HashMap<String, CatalogData>,
    store: Option<JsonSnapshotStore>,
    last_persistence_error: Option<String>,
}

impl fmt::Debug for WidgetApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetApi")
            .field("engine", &self.engine)
            .field("cached_bases", &self.last_good.len())
            .field("store", &self.store)
            .finish()
    }
}

impl WidgetApi {
    pub fn new(engine: RtpEngine, catalog: Box<dyn CatalogSource>) -> Self {
        Self {
            engine,
            catalog,
            last_good: HashMap::new(),
            store: None,
            last_persistence_error: None,
        }
    }

    pub fn engine(&self) -> &RtpEngine {
        &self.engine
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    /// Attach the snapshot file and load whatever state it holds. Read
    /// failures are recorded and leave the engine fresh; they never abort
    /// startup.
    pub fn attach_snapshot_store(&mut self, path: impl Into<PathBuf>) {
        let store = JsonSnapshotStore::open(path);
        match store.load() {
            Ok(Some(snapshot)) => {
                self.engine.restore(snapshot);
                self.last_persistence_error = None;
            }
            Ok(None) => {
                self.last_persistence_error = None;
            }
            Err(err) => {
                self.last_persistence_error = Some(err.to_string());
            }
        }
        self.store = Some(store);
    }

    /// One presentation pass for a base: catalog (or its cached copy), one
    /// engine advance, rtp merge, snapshot flush.
    pub fn refresh(&mut self, base_url: &str) -> Result<RtpReport, RefreshError> {
        // Slash variants of one origin share a namespace and cache entry.
        let base_url = base_url.trim_end_matches('/');
        let catalog = match self.catalog.fetch(base_url) {
            Ok(data) => {
                self.last_good.insert(base_url.to_string(), data.clone());
                data
            }
            Err(err) => match self.last_good.get(base_url) {
                // Fetch failed: advance against the last-known-good catalog
                // rather than dropping every entity's state.
                Some(cached) => cached.clone(),
                None => {
                    return Err(RefreshError::CatalogUnavailable {
                        base_url: base_url.to_string(),
                        reason: err.to_string(),
                    })
                }
            },
        };

        let keys: Vec<GameKey> = catalog.games.iter().map(GameKey::for_game).collect();
        let states = self.engine.advance(base_url, &keys);
        let games = merge_rtp(&catalog, states);

        let report = RtpReport {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            updated: catalog.updated,
            base_url: catalog.base_url,
            providers: catalog.providers,
            games,
        };
        self.flush_snapshot();
        Ok(report)
    }

    fn flush_snapshot(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.save(&self.engine.snapshot()) {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => self.last_persistence_error = Some(err.to_string()),
        }
    }
}
