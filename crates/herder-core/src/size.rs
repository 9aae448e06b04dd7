//! Byte-size strings such as `4096`, `64k` or `1m`

use crate::error::{Error, Result};

/// Parse a byte count with an optional, case-insensitive `k`/`m`/`g` suffix
/// (powers of 1024).
pub fn parse_size(value: &str) -> Result<usize> {
    let trimmed = value.trim();
    if let Ok(bytes) = trimmed.parse::<usize>() {
        return Ok(bytes);
    }

    let Some(suffix) = trimmed.chars().last() else {
        return Err(Error::invalid_size(value));
    };
    let multiplier: usize = match suffix.to_ascii_lowercase() {
        'k' => 1 << 10,
        'm' => 1 << 20,
        'g' => 1 << 30,
        _ => return Err(Error::invalid_size(value)),
    };

    trimmed[..trimmed.len() - suffix.len_utf8()]
        .parse::<usize>()
        .ok()
        .and_then(|count| count.checked_mul(multiplier))
        .ok_or_else(|| Error::invalid_size(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_byte_count() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_size("64k").unwrap(), 65_536);
        assert_eq!(parse_size("1m").unwrap(), 1_048_576);
        assert_eq!(parse_size("1M").unwrap(), 1_048_576);
        assert_eq!(parse_size("2g").unwrap(), 2_147_483_648);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(parse_size("12q"), Err(Error::InvalidSize { .. })));
        assert!(matches!(parse_size("k"), Err(Error::InvalidSize { .. })));
        assert!(matches!(parse_size(""), Err(Error::InvalidSize { .. })));
        assert!(matches!(parse_size("lots"), Err(Error::InvalidSize { .. })));
        assert!(matches!(parse_size("-1k"), Err(Error::InvalidSize { .. })));
    }
}
