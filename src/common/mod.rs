//! Common utilities shared by the engine, the device layer and the CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Round to two decimals, the resolution used to decide whether a
/// generated value is worth writing to the device.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a wait duration given either as seconds or as `HH:MM:SS`
pub fn parse_clock_time(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Some(secs);
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let mut total = 0u64;
    for part in parts {
        let value: u64 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.004), 1.0);
        assert_eq!(round2(1.006), 1.01);
        assert_eq!(round2(-2.345_1), -2.35);
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("00:05:00"), Some(300));
        assert_eq!(parse_clock_time("01:00:30"), Some(3630));
        assert_eq!(parse_clock_time("45"), Some(45));
        assert_eq!(parse_clock_time("5:00"), None);
        assert_eq!(parse_clock_time("aa:bb:cc"), None);
    }

    #[test]
    fn test_parse_clock_time_rejects_overflow() {
        assert_eq!(parse_clock_time("400000000000000000:00:00"), None);
        assert_eq!(parse_clock_time("00:00:18446744073709551615"), Some(u64::MAX));
    }
}
