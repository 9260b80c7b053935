//! Display helpers shared by every front end: hex, numbers, timestamps.

use time::macros::format_description;
use time::OffsetDateTime;

/// Lowercase hex of a byte slice.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

/// Shorten a hex string to `head…tail`, leaving short strings untouched.
/// Input that cannot be split on those byte offsets is returned as is.
pub fn shorten_hex(hex: &str, keep: usize) -> String {
    if keep == 0 || hex.len() <= keep * 2 + 1 {
        return hex.to_owned();
    }
    match (hex.get(..keep), hex.get(hex.len() - keep..)) {
        (Some(head), Some(tail)) => format!("{head}…{tail}"),
        _ => hex.to_owned(),
    }
}

/// `1234567` → `"1,234,567"`.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Unix seconds → `YYYY-MM-DD HH:MM:SS UTC`. Out-of-range values fall back
/// to the raw number so a bad header never breaks rendering.
pub fn format_timestamp(unix_secs: u64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .and_then(|dt| dt.format(&format).ok())
        .map(|s| format!("{s} UTC"))
        .unwrap_or_else(|| unix_secs.to_string())
}

/// Hash rate with an SI unit, two decimals: `1_500_000.0` → `"1.50 MH/s"`.
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: [&str; 7] = ["H/s", "KH/s", "MH/s", "GH/s", "TH/s", "PH/s", "EH/s"];

    if !hashes_per_sec.is_finite() || hashes_per_sec <= 0.0 {
        return "0.00 H/s".to_owned();
    }
    let mut value = hashes_per_sec;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separators() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn timestamp_is_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn hash_rate_units() {
        assert_eq!(format_hash_rate(0.0), "0.00 H/s");
        assert_eq!(format_hash_rate(999.0), "999.00 H/s");
        assert_eq!(format_hash_rate(1_500_000.0), "1.50 MH/s");
        assert_eq!(format_hash_rate(f64::NAN), "0.00 H/s");
    }

    #[test]
    fn shorten_keeps_short_strings() {
        assert_eq!(shorten_hex("abcdef", 4), "abcdef");
        assert_eq!(shorten_hex("0123456789abcdef", 4), "0123…cdef");
        // Split points inside a multi-byte char leave the input alone.
        assert_eq!(shorten_hex("aéééééééé", 2), "aéééééééé");
        assert_eq!(to_hex([0xde, 0xad]), "dead");
    }
}
