use std::fmt;

use rtp_contracts::{CatalogData, CatalogGame, ProviderInfo};

/// Upstream game catalog boundary. The production source scrapes the casino
/// backend per base origin; that lives outside this crate. Implementations
/// only promise a list of games grouped by provider code.
pub trait CatalogSource: Send {
    fn fetch(&self, base_url: &str) -> Result<CatalogData, CatalogError>;
}

#[derive(Debug)]
pub enum CatalogError {
    Unavailable { base_url: String, reason: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { base_url, reason } => {
                write!(f, "catalog unavailable for {base_url}: {reason}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Provider roster of the production widget.
pub fn default_providers() -> Vec<ProviderInfo> {
    [
        ("PP", "Pragmatic Play"),
        ("WREDGENN", "WREDGENN"),
        ("VP", "VPower"),
        ("JILI", "JILI"),
        ("JDB", "JDB"),
        ("ADVP", "AdvantPlay"),
        ("CLOTPLAY", "CLOTPLAY"),
    ]
    .into_iter()
    .map(|(code, display_name)| ProviderInfo {
        code: code.to_string(),
        display_name: display_name.to_string(),
    })
    .collect()
}

/// Fixture source used by the CLI and tests: a stable roster of games per
/// provider, independent of any backend.
#[derive(Debug)]
pub struct StaticCatalog {
    providers: Vec<ProviderInfo>,
    games_per_provider: usize,
}

impl StaticCatalog {
    pub fn new(games_per_provider: usize) -> Self {
        Self {
            providers: default_providers(),
            games_per_provider,
        }
    }

    pub fn with_providers(providers: Vec<ProviderInfo>, games_per_provider: usize) -> Self {
        Self {
            providers,
            games_per_provider,
        }
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(3)
    }
}

impl CatalogSource for StaticCatalog {
    fn fetch(&self, base_url: &str) -> Result<CatalogData, CatalogError> {
        let mut games = Vec::with_capacity(self.providers.len() * self.games_per_provider);
        for provider in &self.providers {
            for index in 1..=self.games_per_provider {
                let code = format!("{}_g{index}", provider.code.to_lowercase());
                games.push(CatalogGame {
                    provider_code: provider.code.clone(),
                    provider_name: provider.display_name.clone(),
                    name: format!("Game {code}"),
                    code,
                    thumb: String::new(),
                });
            }
        }
        Ok(CatalogData {
            updated: "fixture".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            providers: self.providers.clone(),
            games,
        })
    }
}
