//! Free-text parsers for the strings responders and the dashboard produce.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static RELATIVE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*([smhdw])").expect("relative time pattern"));

static ADDRESS_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("address pattern"));

static ADDRESS_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").expect("address scan pattern"));

/// Convert a relative-time descriptor such as `"5m"`, `"2h"`, `"45s ago"` or
/// `"now!"` into seconds.
///
/// Anything mentioning `now` is zero. Loose phrases fall back to a coarse
/// estimate (`"a minute ago"` is 60). Returns `None` for empty input and for
/// anything that does not look like a duration.
pub fn parse_relative_time(s: &str) -> Option<u64> {
    let text = s.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if text.contains("now") {
        return Some(0);
    }

    if let Some(caps) = RELATIVE_TIME.captures(&text) {
        let value: u64 = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return None,
        };
        return value.checked_mul(unit);
    }

    if text.contains("sec") {
        Some(1)
    } else if text.contains("min") {
        Some(60)
    } else if text.contains("hour") {
        Some(3_600)
    } else {
        None
    }
}

/// Convert a monetary string like `"$1.5M"`, `"250K"` or `"1,234.56"` into a
/// decimal. `$`, thousands separators and whitespace are ignored; the suffixes
/// `K M B T` scale by 10^3, 10^6, 10^9 and 10^12.
pub fn parse_money(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let (number, multiplier) = match cleaned.chars().last()? {
        'K' => (&cleaned[..cleaned.len() - 1], 1_000i64),
        'M' => (&cleaned[..cleaned.len() - 1], 1_000_000),
        'B' => (&cleaned[..cleaned.len() - 1], 1_000_000_000),
        'T' => (&cleaned[..cleaned.len() - 1], 1_000_000_000_000),
        _ => (cleaned.as_str(), 1),
    };

    let value = Decimal::from_str(number).ok()?;
    value
        .checked_mul(Decimal::from(multiplier))
        .map(|d| d.normalize())
}

/// Structural check of a base58 asset address (32 to 44 characters, no
/// `0 O I l`). Does not check that the address exists on chain.
pub fn is_valid_address(s: &str) -> bool {
    ADDRESS_EXACT.is_match(s)
}

/// Every address-shaped run in `text`, in order of appearance.
pub fn address_candidates(text: &str) -> impl Iterator<Item = &str> {
    ADDRESS_SCAN.find_iter(text).map(|m| m.as_str())
}
