//! Amounts are carried as integer minor units (cents) and only rendered as
//! decimal strings at the edges (JSON totals, PayPal and PayFast payloads).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
}

/// Render cents as a two-decimal string, e.g. `12345` -> `"123.45"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string such as `"123.45"`, `"10"` or `"0.5"` into cents.
pub fn parse_cents(value: &str) -> Result<i64, AmountParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    let valid = !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.len() <= 2
        && frac.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(AmountParseError::Invalid(value.to_string()));
    }

    let whole: i64 = whole
        .parse()
        .map_err(|_| AmountParseError::Invalid(value.to_string()))?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().unwrap_or(0) * 10,
        _ => frac.parse::<i64>().unwrap_or(0),
    };

    let cents = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| AmountParseError::Invalid(value.to_string()))?;

    Ok(if negative { -cents } else { cents })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(12345), "123.45");
        assert_eq!(format_cents(-250), "-2.50");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(parse_cents("123.45"), Ok(12345));
        assert_eq!(parse_cents("10"), Ok(1000));
        assert_eq!(parse_cents("0.5"), Ok(50));
        assert_eq!(parse_cents(" 7.00 "), Ok(700));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_cents(""), Err(AmountParseError::Empty));
        assert!(parse_cents("1.234").is_err());
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents(".5").is_err());
    }
}
