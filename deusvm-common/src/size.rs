//! Human-readable size strings such as `4GB` or `512mb`.

use thiserror::Error;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("size must not be empty")]
    Empty,

    #[error("invalid size {0:?}: expected a number followed by MB or GB")]
    Invalid(String),

    #[error("size {0:?} is too large")]
    Overflow(String),
}

/// Parse a size with a `MB` or `GB` unit (binary multiples) into bytes.
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(SizeError::Empty);
    }

    let upper = s.to_ascii_uppercase();
    let (digits, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, GIB)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, MIB)
    } else {
        return Err(SizeError::Invalid(input.to_string()));
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SizeError::Invalid(input.to_string()));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| SizeError::Overflow(input.to_string()))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| SizeError::Overflow(input.to_string()))
}

/// Render a byte count in the largest whole unit.
pub fn format_size(bytes: u64) -> String {
    if bytes >= GIB && bytes % GIB == 0 {
        format!("{}GB", bytes / GIB)
    } else if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("4GB").unwrap(), 4 * GIB);
        assert_eq!(parse_size("512MB").unwrap(), 512 * MIB);
        assert_eq!(parse_size(" 2gb ").unwrap(), 2 * GIB);
        assert_eq!(parse_size("0MB").unwrap(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_size(""), Err(SizeError::Empty));
        assert_eq!(parse_size("   "), Err(SizeError::Empty));
        for bad in ["4", "GB", "4 GB", "4TB", "-1GB", "1.5GB", "four GB"] {
            assert!(matches!(parse_size(bad), Err(SizeError::Invalid(_))), "{}", bad);
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(matches!(parse_size("99999999999999999999GB"), Err(SizeError::Overflow(_))));
        assert!(matches!(parse_size("18446744073709551615GB"), Err(SizeError::Overflow(_))));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_size(4 * GIB), "4GB");
        assert_eq!(format_size(1536 * MIB), "1536MB");
        assert_eq!(format_size(1000), "1000B");
    }
}
