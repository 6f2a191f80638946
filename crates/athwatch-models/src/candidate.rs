use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A newly listed asset as scraped from the discovery dashboard.
///
/// Every field is kept verbatim; the engine parses ages and amounts itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    /// Base58 asset address. Doubles as the request identifier.
    #[serde(alias = "ca")]
    pub address: String,
    #[serde(default, alias = "tic")]
    pub ticker: String,
    /// Relative listing age, e.g. "12m" or "1h".
    #[serde(alias = "age_str")]
    pub age: String,
    #[serde(default, alias = "mc")]
    pub market_cap: String,
    #[serde(default, alias = "l")]
    pub liquidity: String,
    #[serde(default, alias = "v")]
    pub volume: String,
}

impl Candidate {
    /// Ticker for log lines, falling back to a short address prefix.
    pub fn label(&self) -> &str {
        if self.ticker.is_empty() {
            let end = self
                .address
                .char_indices()
                .nth(6)
                .map(|(i, _)| i)
                .unwrap_or(self.address.len());
            &self.address[..end]
        } else {
            &self.ticker
        }
    }
}

/// The candidate together with its parsed metrics. Carried through the
/// correlation entry so the final decision can be enriched with business
/// data the responders never see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    pub candidate: Candidate,
    pub age_seconds: u64,
    pub market_cap: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl RequestContext {
    pub fn address(&self) -> &str {
        &self.candidate.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Candidate {
        Candidate {
            address: "So11111111111111111111111111111111111111112".to_string(),
            ticker: "WIF".to_string(),
            age: "12m".to_string(),
            market_cap: "$1.2M".to_string(),
            liquidity: "$80K".to_string(),
            volume: "$200K".to_string(),
        }
    }

    #[test]
    fn candidate_from_scraper_json_with_missing_metrics() {
        let json = r#"{"address": "So11111111111111111111111111111111111111112", "age": "3m"}"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.age, "3m");
        assert!(candidate.ticker.is_empty());
        assert!(candidate.volume.is_empty());
    }

    #[test]
    fn candidate_from_short_scraper_keys() {
        let json = r#"{"ca": "So11111111111111111111111111111111111111112", "tic": "BONK", "age_str": "9m", "mc": "$1M", "l": "$20K", "v": "$310K"}"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.ticker, "BONK");
        assert_eq!(candidate.age, "9m");
        assert_eq!(candidate.volume, "$310K");
    }

    #[test]
    fn label_prefers_ticker() {
        assert_eq!(sample().label(), "WIF");

        let mut anonymous = sample();
        anonymous.ticker.clear();
        assert_eq!(anonymous.label(), "So1111");
    }

    #[test]
    fn roundtrip_request_context() {
        let context = RequestContext {
            candidate: sample(),
            age_seconds: 720,
            market_cap: Some(dec!(1200000)),
            liquidity: Some(dec!(80000)),
            volume: None,
        };
        let json = serde_json::to_string(&context).unwrap();
        let parsed: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(context, parsed);
        assert_eq!(parsed.address(), "So11111111111111111111111111111111111111112");
    }
}
