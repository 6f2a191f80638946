use std::path::Path;
use std::str::FromStr;

use athwatch_models::{PipelineConfig, VerificationMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite record database.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Max records held in the in-memory hot cache.
    #[serde(default = "default_hot_capacity")]
    pub hot_cache_capacity: u64,
    #[serde(default = "default_hot_ttl")]
    pub hot_cache_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            hot_cache_capacity: default_hot_capacity(),
            hot_cache_ttl_seconds: default_hot_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// JSON candidate list rewritten by the browser scraper every cycle.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "data/athwatch.db".to_string()
}
fn default_hot_capacity() -> u64 {
    10_000
}
fn default_hot_ttl() -> u64 {
    600
}
fn default_snapshot_path() -> String {
    "data/candidates.json".to_string()
}

impl DaemonConfig {
    /// Read the TOML file at `path`, apply process environment overrides and
    /// validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: DaemonConfig = toml::from_str(&text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment values onto the file configuration.
    ///
    /// `lookup` returns the raw value for a key; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DaemonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let responders = &mut self.pipeline.responders;

        if let Some(v) = get("BOT_ATH1") {
            responders.verification_primary = Some(v);
        }
        if let Some(v) = get("BOT_ATH2") {
            responders.verification_secondary = Some(v);
        }
        if let Some(v) = get("BOT_BUYSELL1") {
            responders.execution_primary = v;
        }
        if let Some(v) = get("BOT_BUYSELL2") {
            responders.execution_secondary = v;
        }
        if let Some(v) = get("SELL_MARKER1") {
            responders.sell_marker_primary = Some(v);
        }
        if let Some(v) = get("SELL_MARKER2") {
            responders.sell_marker_secondary = Some(v);
        }

        let timing = &mut self.pipeline.timing;
        if let Some(secs) = parse_env::<u64>("BOT_ATH_TOUT", get("BOT_ATH_TOUT"))? {
            timing.responder_timeout_ms = secs.saturating_mul(1_000);
        }
        if let Some(second) = parse_env::<u32>("CHTIME", get("CHTIME"))? {
            timing.scrape_second = second;
        }
        if let Some(ms) = parse_env::<u64>("SEND_DELAY_MS", get("SEND_DELAY_MS"))? {
            timing.send_delay_ms = ms;
        }

        let thresholds = &mut self.pipeline.thresholds;
        if let Some(secs) = parse_env::<u64>("THRESHOLD_ATH_SECONDS", get("THRESHOLD_ATH_SECONDS"))?
        {
            thresholds.max_ath_seconds = secs;
        }
        if let Some(volume) = parse_env::<Decimal>("THRESHOLD_VOLUME", get("THRESHOLD_VOLUME"))? {
            thresholds.volume_split = volume;
        }
        if let Some(minutes) =
            parse_env::<u64>("MIN_COIN_AGE_MINUTES", get("MIN_COIN_AGE_MINUTES"))?
        {
            thresholds.min_age_seconds = minutes.saturating_mul(60);
        }

        if let Some(mode) = parse_env::<VerificationMode>("ATH_MODE", get("ATH_MODE"))? {
            self.pipeline.verification_mode = mode;
        }
        if let Some(path) = get("DATABASE_NAME") {
            self.store.sqlite_path = path;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        self.pipeline.validate().map_err(DaemonError::Config)?;
        if self.store.sqlite_path.trim().is_empty() {
            return Err(DaemonError::Config("store.sqlite_path is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: Option<String>) -> Result<Option<T>, DaemonError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|e| DaemonError::Config(format!("{key}={v}: {e}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use athwatch_models::Slot;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    const EXAMPLE: &str = r#"
[pipeline]
verification_mode = "both"

[pipeline.responders]
verification_primary = "@AthProbeBot"
verification_secondary = "@AthScanBot"
execution_primary = "@FastBuyBot"
execution_secondary = "@BulkBuyBot"

[pipeline.thresholds]
max_ath_seconds = 60

[store]
sqlite_path = "data/test.db"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn deserialize_example_config() {
        let config: DaemonConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.store.sqlite_path, "data/test.db");
        assert_eq!(config.store.hot_cache_capacity, 10_000);
        assert_eq!(config.scraper.snapshot_path, "data/candidates.json");
        assert_eq!(config.pipeline.timing.scrape_second, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shipped_config_is_valid() {
        let config: DaemonConfig =
            toml::from_str(include_str!("../../../config/athwatch.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.responders.sell_marker(Slot::Secondary), Some("ref_bulk_"));
        assert_eq!(config.pipeline.thresholds.volume_split, dec!(150000));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: DaemonConfig = toml::from_str(EXAMPLE).unwrap();
        config
            .apply_env(env(&[
                ("BOT_ATH2", "@OtherScanBot"),
                ("SELL_MARKER1", "ref_fast_"),
                ("BOT_ATH_TOUT", "5"),
                ("CHTIME", "30"),
                ("THRESHOLD_ATH_SECONDS", "90"),
                ("THRESHOLD_VOLUME", "250000"),
                ("MIN_COIN_AGE_MINUTES", "10"),
                ("ATH_MODE", "2"),
                ("DATABASE_NAME", "axiom.db"),
                ("BOT_BUYSELL1", ""),
            ]))
            .unwrap();

        let p = &config.pipeline;
        assert_eq!(p.responders.verification_peer(Slot::Secondary), Some("@OtherScanBot"));
        assert_eq!(p.responders.sell_marker(Slot::Primary), Some("ref_fast_"));
        // Blank values leave the file setting alone.
        assert_eq!(p.responders.execution_primary, "@FastBuyBot");
        assert_eq!(p.timing.responder_timeout(Slot::Primary), Duration::from_secs(5));
        assert_eq!(p.timing.scrape_second, 30);
        assert_eq!(p.thresholds.max_ath_seconds, 90);
        assert_eq!(p.thresholds.volume_split, dec!(250000));
        assert_eq!(p.thresholds.min_age_seconds, 600);
        assert_eq!(p.verification_mode, VerificationMode::Secondary);
        assert_eq!(config.store.sqlite_path, "axiom.db");
    }

    #[test]
    fn bad_env_value_is_a_config_error() {
        let mut config: DaemonConfig = toml::from_str(EXAMPLE).unwrap();
        let err = config.apply_env(env(&[("CHTIME", "soon")])).unwrap_err();
        assert!(matches!(err, DaemonError::Config(msg) if msg.contains("CHTIME")));
    }

    #[test]
    fn load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("athwatch.toml");
        std::fs::write(&path, EXAMPLE.replace("@FastBuyBot", "")).unwrap();
        // Nothing in the test environment sets BOT_BUYSELL1.
        if std::env::var("BOT_BUYSELL1").is_err() {
            assert!(matches!(
                DaemonConfig::load(&path),
                Err(DaemonError::Config(_))
            ));
        }
        assert!(DaemonConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
