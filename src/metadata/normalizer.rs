//! Per-field value normalizers
//!
//! A normalizer maps a raw literal to its byte-comparable indexed form. It
//! is deterministic and may fail; failure only means the normalizer does not
//! apply to the literal.
//!
//! Every normalizer is idempotent: normalizing an already normalized value
//! returns it unchanged. Expansion relies on this.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Result type for normalization
pub type NormalizationResult<T> = Result<T, NormalizationError>;

/// A normalizer could not handle a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("{normalizer} cannot normalize '{value}'")]
    Unparseable { normalizer: &'static str, value: String },

    #[error("{normalizer} cannot normalize regex '{pattern}'")]
    UnsupportedRegex { normalizer: &'static str, pattern: String },
}

impl NormalizationError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            NormalizationError::Unparseable { .. } => "SHARDQUERY_NORMALIZATION_UNPARSEABLE",
            NormalizationError::UnsupportedRegex { .. } => "SHARDQUERY_NORMALIZATION_UNSUPPORTED_REGEX",
        }
    }
}

/// Maps raw literals to indexed values
pub trait Normalizer: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics
    fn name(&self) -> &'static str;

    /// Normalizes a literal value
    fn normalize(&self, value: &str) -> NormalizationResult<String>;

    /// Normalizes a regular expression so it matches normalized values
    fn normalize_regex(&self, pattern: &str) -> NormalizationResult<String>;
}

/// Leaves values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNormalizer;

impl Normalizer for NoOpNormalizer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn normalize(&self, value: &str) -> NormalizationResult<String> {
        Ok(value.to_string())
    }

    fn normalize_regex(&self, pattern: &str) -> NormalizationResult<String> {
        Ok(pattern.to_string())
    }
}

/// Lower-cases values
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerCaseNormalizer;

impl Normalizer for LowerCaseNormalizer {
    fn name(&self) -> &'static str {
        "lowercase"
    }

    fn normalize(&self, value: &str) -> NormalizationResult<String> {
        Ok(value.to_lowercase())
    }

    fn normalize_regex(&self, pattern: &str) -> NormalizationResult<String> {
        // escape sequences such as \D keep their case
        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.extend(c.to_lowercase());
            }
        }
        Ok(out)
    }
}

/// Order-preserving lexicographic encoding of numbers
///
/// ```text
/// 0      -> +AE0
/// 1      -> +aE1
/// 55     -> +bE5.5
/// 12345  -> +eE1.2345
/// 0.5    -> +ZE5
/// -1     -> !ZE9
/// ```
///
/// Positive values are prefixed `+`, negatives `!` so they sort first. The
/// exponent letter and, for negatives, the mantissa digits are inverted so
/// that byte order follows numeric order.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberNormalizer;

const MAX_EXPONENT: i32 = 25;

impl NumberNormalizer {
    fn unparseable(value: &str) -> NormalizationError {
        NormalizationError::Unparseable {
            normalizer: "number",
            value: value.to_string(),
        }
    }

    fn encode(&self, raw: &str) -> NormalizationResult<String> {
        let value = raw.trim();
        if encoded_number_pattern().is_some_and(|p| p.is_match(value)) {
            return Ok(value.to_string());
        }
        if !number_pattern().is_some_and(|p| p.is_match(value)) {
            return Err(Self::unparseable(raw));
        }

        let (negative, unsigned) = match value.as_bytes()[0] {
            b'-' => (true, &value[1..]),
            b'+' => (false, &value[1..]),
            _ => (false, value),
        };
        let (mantissa, exp_suffix) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
            Some(idx) => (&unsigned[..idx], &unsigned[idx + 1..]),
            None => (unsigned, ""),
        };
        let exp_suffix: i32 = if exp_suffix.is_empty() {
            0
        } else {
            exp_suffix.parse().map_err(|_| Self::unparseable(raw))?
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(idx) => (&mantissa[..idx], &mantissa[idx + 1..]),
            None => (mantissa, ""),
        };

        let digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .collect();
        let Some(leading_zeros) = digits.iter().position(|d| *d != 0) else {
            return Ok("+AE0".to_string());
        };
        let last_significant = digits.iter().rposition(|d| *d != 0).unwrap_or(leading_zeros);
        let significant = &digits[leading_zeros..=last_significant];
        let exponent = i32::try_from(int_part.len())
            .ok()
            .zip(i32::try_from(leading_zeros).ok())
            .and_then(|(len, zeros)| (len - 1).checked_sub(zeros))
            .and_then(|e| e.checked_add(exp_suffix))
            .ok_or_else(|| Self::unparseable(raw))?;
        if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
            return Err(Self::unparseable(raw));
        }

        let (sign, letter, mantissa_digits) = if negative {
            let letter = if exponent >= 0 {
                (b'Z' - exponent as u8) as char
            } else {
                (b'a' + (-exponent - 1) as u8) as char
            };
            let n = significant.len() - 1;
            let complement: Vec<u8> = significant
                .iter()
                .enumerate()
                .map(|(i, d)| if i < n { 9 - d } else { 10 - d })
                .collect();
            ('!', letter, complement)
        } else {
            let letter = if exponent >= 0 {
                (b'a' + exponent as u8) as char
            } else {
                (b'Z' - (-exponent - 1) as u8) as char
            };
            ('+', letter, significant.to_vec())
        };

        let mut out = format!("{}{}E{}", sign, letter, mantissa_digits[0]);
        if mantissa_digits.len() > 1 {
            out.push('.');
            for d in &mantissa_digits[1..] {
                out.push((b'0' + d) as char);
            }
        }
        Ok(out)
    }
}

impl Normalizer for NumberNormalizer {
    fn name(&self) -> &'static str {
        "number"
    }

    fn normalize(&self, value: &str) -> NormalizationResult<String> {
        self.encode(value)
    }

    fn normalize_regex(&self, pattern: &str) -> NormalizationResult<String> {
        let literal = regex_literal(pattern).ok_or_else(|| NormalizationError::UnsupportedRegex {
            normalizer: "number",
            pattern: pattern.to_string(),
        })?;
        let encoded = self
            .encode(&literal)
            .map_err(|_| NormalizationError::UnsupportedRegex {
                normalizer: "number",
                pattern: pattern.to_string(),
            })?;
        Ok(regex::escape(&encoded))
    }
}

/// Zero-pads IPv4 octets: `127.0.0.1 -> 127.000.000.001`
#[derive(Debug, Clone, Copy, Default)]
pub struct IpAddressNormalizer;

impl IpAddressNormalizer {
    fn pad(&self, value: &str) -> Option<String> {
        let octets: Vec<&str> = value.trim().split('.').collect();
        if octets.len() != 4 {
            return None;
        }
        let mut padded = Vec::with_capacity(4);
        for octet in octets {
            if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: u16 = octet.parse().ok()?;
            if n > 255 {
                return None;
            }
            padded.push(format!("{:03}", n));
        }
        Some(padded.join("."))
    }
}

impl Normalizer for IpAddressNormalizer {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn normalize(&self, value: &str) -> NormalizationResult<String> {
        self.pad(value).ok_or_else(|| NormalizationError::Unparseable {
            normalizer: "ip",
            value: value.to_string(),
        })
    }

    fn normalize_regex(&self, pattern: &str) -> NormalizationResult<String> {
        regex_literal(pattern)
            .and_then(|literal| self.pad(&literal))
            .map(|padded| regex::escape(&padded))
            .ok_or_else(|| NormalizationError::UnsupportedRegex {
                normalizer: "ip",
                pattern: pattern.to_string(),
            })
    }
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok())
        .as_ref()
}

fn encoded_number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[+!][A-Za-z]E\d(\.\d+)?$").ok())
        .as_ref()
}

/// Returns the literal text matched by a metacharacter-free pattern
///
/// Escaped punctuation counts as literal; character classes such as `\d`
/// and unescaped metacharacters do not.
pub fn regex_literal(pattern: &str) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars.next()?;
                if next.is_alphanumeric() {
                    return None;
                }
                out.push(next);
            }
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_encoding() {
        let n = NumberNormalizer;
        assert_eq!(n.normalize("0").unwrap(), "+AE0");
        assert_eq!(n.normalize("1").unwrap(), "+aE1");
        assert_eq!(n.normalize("4").unwrap(), "+aE4");
        assert_eq!(n.normalize("10").unwrap(), "+bE1");
        assert_eq!(n.normalize("55").unwrap(), "+bE5.5");
        assert_eq!(n.normalize("100").unwrap(), "+cE1");
        assert_eq!(n.normalize("12345").unwrap(), "+eE1.2345");
        assert_eq!(n.normalize("0.5").unwrap(), "+ZE5");
        assert_eq!(n.normalize("1e2").unwrap(), "+cE1");
        assert_eq!(n.normalize("-1").unwrap(), "!ZE9");
        assert_eq!(n.normalize("-1.5").unwrap(), "!ZE8.5");
    }

    #[test]
    fn test_number_encoding_preserves_order() {
        let n = NumberNormalizer;
        let values = ["-100", "-9.5", "-9", "-1.5", "-1", "-0.05", "0", "0.05", "0.5", "1", "1.5", "9", "10", "55", "12345"];
        let encoded: Vec<String> = values.iter().map(|v| n.normalize(v).unwrap()).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn test_number_idempotent() {
        let n = NumberNormalizer;
        for v in ["1", "12345", "-3.25", "0"] {
            let once = n.normalize(v).unwrap();
            assert_eq!(n.normalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_number_rejects_text() {
        assert!(NumberNormalizer.normalize("bar").is_err());
        assert!(NumberNormalizer.normalize("").is_err());
        assert!(NumberNormalizer.normalize("1e99").is_err());
    }

    #[test]
    fn test_number_extreme_exponent_is_unparseable() {
        let n = NumberNormalizer;
        for raw in ["10e2147483647", "1e2147483647", "1e-2147483648", "0.01e-2147483648", "1e99999999999"] {
            let err = n.normalize(raw).unwrap_err();
            assert!(matches!(err, NormalizationError::Unparseable { .. }), "{}", raw);
        }
    }

    #[test]
    fn test_number_regex() {
        let n = NumberNormalizer;
        assert_eq!(n.normalize_regex("1").unwrap(), r"\+aE1");
        assert_eq!(n.normalize_regex(r"\+aE1").unwrap(), r"\+aE1");
        assert!(n.normalize_regex("1.*").is_err());
    }

    #[test]
    fn test_ip_normalizer() {
        let ip = IpAddressNormalizer;
        assert_eq!(ip.normalize("127.0.0.1").unwrap(), "127.000.000.001");
        assert_eq!(ip.normalize("127.000.000.001").unwrap(), "127.000.000.001");
        assert!(ip.normalize("256.0.0.1").is_err());
        assert!(ip.normalize("bar").is_err());
        assert_eq!(ip.normalize_regex(r"1\.2\.3\.4").unwrap(), r"001\.002\.003\.004");
        assert!(ip.normalize_regex(r"1\.2\.3\..*").is_err());
    }

    #[test]
    fn test_lowercase_regex_keeps_escapes() {
        let lc = LowerCaseNormalizer;
        assert_eq!(lc.normalize("BaR").unwrap(), "bar");
        assert_eq!(lc.normalize_regex(r"Ba\D.*").unwrap(), r"ba\D.*");
    }

    #[test]
    fn test_regex_literal() {
        assert_eq!(regex_literal(r"1\.2"), Some("1.2".to_string()));
        assert_eq!(regex_literal("abc"), Some("abc".to_string()));
        assert_eq!(regex_literal("a.c"), None);
        assert_eq!(regex_literal(r"\d"), None);
    }
}
