use athwatch_models::Slot;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::parse::{address_candidates, parse_relative_time};

/// `ATH: $1.2M (45s ago)`
static PRIMARY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ATH:\s*\$[\d.,KMGTPEZY]+\s*\(([^)]+ago)\)").expect("primary value pattern")
});

/// `ATH: $1.2M [45s]` or `ATH: $1.2M (now!)`
static SECONDARY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ATH:\s*\$[\d.,KMGTPEZY]+\s*(?:\[([^\]]+)\]|\((now!)\))")
        .expect("secondary value pattern")
});

/// Outcome of matching one verification reply against the in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ok { request_id: String, seconds: u64 },
    NotAvailable { request_id: String },
    /// A value was present but could not be read as a relative time.
    Malformed { request_id: String, raw: String },
    /// No live request is mentioned. Expected chatter, dropped silently.
    NoMatch,
}

impl Verdict {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Verdict::Ok { request_id, .. }
            | Verdict::NotAvailable { request_id }
            | Verdict::Malformed { request_id, .. } => Some(request_id),
            Verdict::NoMatch => None,
        }
    }
}

/// Classify a reply from the verification responder in `slot`.
///
/// Every address in the text is tried in order; the first one `is_live`
/// accepts becomes the request id. Each responder formats its value
/// differently, so the value pattern depends on `slot`. A reply that names
/// the request but carries no value (`ATH: N/A`, "not found", or anything
/// else) is `NotAvailable`; a value present alongside such a marker wins.
pub fn classify_verification<F>(text: &str, slot: Slot, is_live: F) -> Verdict
where
    F: Fn(&str) -> bool,
{
    let Some(request_id) = address_candidates(text).find(|a| is_live(a)) else {
        return Verdict::NoMatch;
    };
    let request_id = request_id.to_string();

    let raw = match slot {
        Slot::Primary => PRIMARY_VALUE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str()),
        Slot::Secondary => SECONDARY_VALUE
            .captures(text)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str()),
    };

    let Some(raw) = raw.map(str::trim) else {
        debug!(address = %request_id, responder = %slot, "No value in verification reply");
        return Verdict::NotAvailable { request_id };
    };

    match parse_relative_time(raw) {
        Some(seconds) => Verdict::Ok {
            request_id,
            seconds,
        },
        None => Verdict::Malformed {
            request_id,
            raw: raw.to_string(),
        },
    }
}
