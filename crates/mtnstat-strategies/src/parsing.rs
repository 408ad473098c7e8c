use regex::Regex;
use std::sync::OnceLock;

fn ratio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").unwrap())
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)%").unwrap())
}

/// Matches `(\d+)\s*/\s*(\d+)` -> `(open, total)`.
pub fn parse_ratio(text: &str) -> Option<(u32, u32)> {
    let caps = ratio_re().captures(text)?;
    let open: u32 = caps.get(1)?.as_str().parse().ok()?;
    let total: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some((open, total))
}

/// Matches `(\d+)%` -> an integer 0-100, or `None` if out of range/absent.
pub fn parse_percent(text: &str) -> Option<u8> {
    let caps = percent_re().captures(text)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    if value > 100 {
        None
    } else {
        Some(value as u8)
    }
}

/// True iff `text` contains "open" and does not contain "closed", case
/// insensitive. Empty input is false.
pub fn derive_is_open(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    lower.contains("open") && !lower.contains("closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_parses_simple_fraction() {
        assert_eq!(parse_ratio("8 / 10"), Some((8, 10)));
        assert_eq!(parse_ratio("70/82"), Some((70, 82)));
    }

    #[test]
    fn ratio_returns_none_without_a_match() {
        assert_eq!(parse_ratio("no ratio here"), None);
    }

    #[test]
    fn percent_parses_in_range() {
        assert_eq!(parse_percent("42%"), Some(42));
        assert_eq!(parse_percent("100%"), Some(100));
    }

    #[test]
    fn percent_rejects_out_of_range_and_absent() {
        assert_eq!(parse_percent("150%"), None);
        assert_eq!(parse_percent("nope"), None);
    }

    #[test]
    fn is_open_follows_the_open_not_closed_rule() {
        assert!(derive_is_open("OPEN FOR SEASON"));
        assert!(!derive_is_open("temporarily closed"));
        assert!(!derive_is_open(""));
        assert!(!derive_is_open("  "));
    }
}
