use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::responder::{DecisionPolicy, Slot, VerificationMode};

/// Everything the correlation engine needs to know to run a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub responders: RespondersConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub verification_mode: VerificationMode,
    #[serde(default)]
    pub decision_policy: DecisionPolicy,
}

impl PipelineConfig {
    /// Verification slots that are both selected by the mode and have a peer.
    pub fn active_verification_slots(&self) -> Vec<Slot> {
        self.verification_mode
            .slots()
            .iter()
            .copied()
            .filter(|slot| self.responders.verification_peer(*slot).is_some())
            .collect()
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.active_verification_slots().is_empty() {
            return Err(format!(
                "no verification responder configured for mode {:?}",
                self.verification_mode
            ));
        }
        for slot in Slot::ALL {
            if self.responders.execution_peer(slot).trim().is_empty() {
                return Err(format!("execution responder '{slot}' is not set"));
            }
        }
        if self.timing.scrape_second > 59 {
            return Err(format!(
                "scrape_second must be within 0-59, got {}",
                self.timing.scrape_second
            ));
        }
        if self.timing.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Chat identities of the external responders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RespondersConfig {
    pub verification_primary: Option<String>,
    pub verification_secondary: Option<String>,
    pub execution_primary: String,
    pub execution_secondary: String,
    /// Referral marker the primary executor embeds in its sell reports.
    #[serde(default)]
    pub sell_marker_primary: Option<String>,
    #[serde(default)]
    pub sell_marker_secondary: Option<String>,
}

impl RespondersConfig {
    pub fn verification_peer(&self, slot: Slot) -> Option<&str> {
        let peer = match slot {
            Slot::Primary => self.verification_primary.as_deref(),
            Slot::Secondary => self.verification_secondary.as_deref(),
        };
        peer.filter(|p| !p.trim().is_empty())
    }

    pub fn execution_peer(&self, slot: Slot) -> &str {
        match slot {
            Slot::Primary => &self.execution_primary,
            Slot::Secondary => &self.execution_secondary,
        }
    }

    pub fn sell_marker(&self, slot: Slot) -> Option<&str> {
        let marker = match slot {
            Slot::Primary => self.sell_marker_primary.as_deref(),
            Slot::Secondary => self.sell_marker_secondary.as_deref(),
        };
        marker.filter(|m| !m.is_empty())
    }
}

/// Business filters applied before and after verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdsConfig {
    /// Candidates must be strictly older than this to be dispatched.
    #[serde(default = "default_min_age_seconds")]
    pub min_age_seconds: u64,
    /// Decisions with a larger all-time-high age are discarded.
    #[serde(default = "default_max_ath_seconds")]
    pub max_ath_seconds: u64,
    /// Volume below the split goes to the primary executor, the rest to the
    /// secondary.
    #[serde(default = "default_volume_split")]
    pub volume_split: Decimal,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            min_age_seconds: default_min_age_seconds(),
            max_ath_seconds: default_max_ath_seconds(),
            volume_split: default_volume_split(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// How long a verification responder may stay silent.
    #[serde(default = "default_responder_timeout_ms")]
    pub responder_timeout_ms: u64,
    /// Per-slot override of `responder_timeout_ms`.
    #[serde(default)]
    pub primary_timeout_ms: Option<u64>,
    #[serde(default)]
    pub secondary_timeout_ms: Option<u64>,
    /// Cadence of the timeout monitor.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Minimum gap between two outbound sends.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Second of every minute at which the dashboard is scraped.
    #[serde(default = "default_scrape_second")]
    pub scrape_second: u32,
}

impl TimingConfig {
    pub fn responder_timeout(&self, slot: Slot) -> Duration {
        let ms = match slot {
            Slot::Primary => self.primary_timeout_ms,
            Slot::Secondary => self.secondary_timeout_ms,
        }
        .unwrap_or(self.responder_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            responder_timeout_ms: default_responder_timeout_ms(),
            primary_timeout_ms: None,
            secondary_timeout_ms: None,
            sweep_interval_ms: default_sweep_interval_ms(),
            send_delay_ms: default_send_delay_ms(),
            scrape_second: default_scrape_second(),
        }
    }
}

fn default_min_age_seconds() -> u64 {
    8 * 60
}
fn default_max_ath_seconds() -> u64 {
    60
}
fn default_volume_split() -> Decimal {
    Decimal::from(150_000)
}
fn default_responder_timeout_ms() -> u64 {
    3_000
}
fn default_sweep_interval_ms() -> u64 {
    500
}
fn default_send_delay_ms() -> u64 {
    1_100
}
fn default_scrape_second() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn responders() -> RespondersConfig {
        RespondersConfig {
            verification_primary: Some("@AthProbeBot".to_string()),
            verification_secondary: Some("@AthScanBot".to_string()),
            execution_primary: "@FastBuyBot".to_string(),
            execution_secondary: "@BulkBuyBot".to_string(),
            sell_marker_primary: Some("ref_fast_".to_string()),
            sell_marker_secondary: None,
        }
    }

    #[test]
    fn config_from_minimal_toml() {
        let toml_str = r#"
[responders]
verification_primary = "@AthProbeBot"
execution_primary = "@FastBuyBot"
execution_secondary = "@BulkBuyBot"
"#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.thresholds.min_age_seconds, 480);
        assert_eq!(config.thresholds.max_ath_seconds, 60);
        assert_eq!(config.thresholds.volume_split, dec!(150000));
        assert_eq!(config.timing.send_delay_ms, 1100);
        assert_eq!(config.verification_mode, VerificationMode::Both);
        assert_eq!(config.decision_policy, DecisionPolicy::FirstGood);
        // Secondary verifier is not configured, so only primary is active.
        assert_eq!(config.active_verification_slots(), vec![Slot::Primary]);
    }

    #[test]
    fn config_from_full_toml() {
        let toml_str = r#"
verification_mode = "secondary"
decision_policy = "best_of_both"

[responders]
verification_primary = "@AthProbeBot"
verification_secondary = "@AthScanBot"
execution_primary = "@FastBuyBot"
execution_secondary = "@BulkBuyBot"
sell_marker_secondary = "bulk-ref-"

[thresholds]
min_age_seconds = 600
max_ath_seconds = 90
volume_split = "250000"

[timing]
responder_timeout_ms = 5000
secondary_timeout_ms = 8000
scrape_second = 30
"#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.active_verification_slots(), vec![Slot::Secondary]);
        assert_eq!(config.decision_policy, DecisionPolicy::BestOfBoth);
        assert_eq!(config.thresholds.volume_split, dec!(250000));
        assert_eq!(
            config.timing.responder_timeout(Slot::Primary),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.timing.responder_timeout(Slot::Secondary),
            Duration::from_secs(8)
        );
        assert_eq!(config.responders.sell_marker(Slot::Secondary), Some("bulk-ref-"));
        assert_eq!(config.responders.sell_marker(Slot::Primary), None);
    }

    #[test]
    fn blank_peer_counts_as_unset() {
        let mut r = responders();
        r.verification_secondary = Some("  ".to_string());
        assert_eq!(r.verification_peer(Slot::Secondary), None);
        assert_eq!(r.verification_peer(Slot::Primary), Some("@AthProbeBot"));
        assert_eq!(r.execution_peer(Slot::Secondary), "@BulkBuyBot");
    }

    #[test]
    fn validate_rejects_unusable_configs() {
        let mut config = PipelineConfig {
            responders: responders(),
            thresholds: ThresholdsConfig::default(),
            timing: TimingConfig::default(),
            verification_mode: VerificationMode::Secondary,
            decision_policy: DecisionPolicy::FirstGood,
        };
        assert!(config.validate().is_ok());

        config.responders.verification_secondary = None;
        assert!(config.validate().unwrap_err().contains("verification"));

        config.verification_mode = VerificationMode::Both;
        config.responders.execution_secondary = String::new();
        assert!(config.validate().unwrap_err().contains("secondary"));

        config.responders.execution_secondary = "@BulkBuyBot".to_string();
        config.timing.scrape_second = 60;
        assert!(config.validate().unwrap_err().contains("scrape_second"));

        config.timing.scrape_second = 0;
        config.timing.sweep_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrip_pipeline_config() {
        let config = PipelineConfig {
            responders: responders(),
            thresholds: ThresholdsConfig::default(),
            timing: TimingConfig::default(),
            verification_mode: VerificationMode::Both,
            decision_policy: DecisionPolicy::FirstGood,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
