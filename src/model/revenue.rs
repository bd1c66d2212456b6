//! AnnualRevenue normalization.
//!
//! On disk the value is a thousands-grouped decimal (`1,234,567.00`). In API
//! payloads it is the ungrouped form (`1234567.00`). The remote store may
//! also hand back scientific notation (`1.5E7`), which is expanded exactly.
//!
//! Digits are kept as text, so conversion never rounds: the fractional
//! digits that came in are the fractional digits that go out.

use std::fmt;

use serde::{Serialize, Serializer};

/// Furthest an exponent may move the decimal point from the mantissa.
/// Anything beyond this is left unparsed rather than zero-padded.
const MAX_POINT_SHIFT: i64 = 64;

/// An exact, sign-aware decimal kept as digit strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    negative: bool,
    integer: String,
    fraction: Option<String>,
}

impl Decimal {
    /// Ungrouped form, e.g. `1234567.00`.
    #[must_use]
    pub fn to_plain(&self) -> String {
        let mut out = String::with_capacity(self.integer.len() + 4);
        if self.negative {
            out.push('-');
        }
        out.push_str(&self.integer);
        if let Some(fraction) = &self.fraction {
            out.push('.');
            out.push_str(fraction);
        }
        out
    }

    /// Thousands-grouped form, e.g. `1,234,567.00`.
    #[must_use]
    pub fn to_grouped(&self) -> String {
        let mut out = String::with_capacity(self.integer.len() * 4 / 3 + 4);
        if self.negative {
            out.push('-');
        }
        let lead = self.integer.len() % 3;
        for (i, ch) in self.integer.chars().enumerate() {
            if i > 0 && (i + 3 - lead) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        if let Some(fraction) = &self.fraction {
            out.push('.');
            out.push_str(fraction);
        }
        out
    }
}

/// AnnualRevenue as held inside a [`Record`](super::Record).
///
/// Malformed text is retained as [`AnnualRevenue::Unparsed`] so it can be
/// passed through untouched on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnualRevenue {
    Amount(Decimal),
    Unparsed(String),
}

impl AnnualRevenue {
    /// Parse either the grouped disk form or the plain/scientific wire form.
    ///
    /// Never fails: unrecognised text becomes `Unparsed`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        parse_decimal(text.trim()).map_or_else(|| Self::Unparsed(text.to_string()), Self::Amount)
    }

    /// Whether the value was recognised as a number.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Amount(_))
    }

    /// Human-readable disk form.
    #[must_use]
    pub fn to_grouped(&self) -> String {
        match self {
            Self::Amount(d) => d.to_grouped(),
            Self::Unparsed(raw) => raw.clone(),
        }
    }

    /// Ungrouped API payload form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Amount(d) => d.to_plain(),
            Self::Unparsed(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for AnnualRevenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_grouped())
    }
}

impl Serialize for AnnualRevenue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    // Scientific notation only appears without grouping.
    if let Some(pos) = body.find(['e', 'E']) {
        if body.contains(',') {
            return None;
        }
        let exponent: i64 = body[pos + 1..].parse().ok()?;
        let (integer, fraction) = split_plain(&body[..pos])?;
        return expand_exponent(negative, &integer, fraction.as_deref(), exponent);
    }

    let (integer, fraction) = if body.contains(',') {
        split_grouped(body)?
    } else {
        split_plain(body)?
    };
    Some(Decimal {
        negative,
        integer,
        fraction,
    })
}

fn split_plain(body: &str) -> Option<(String, Option<String>)> {
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(f) = frac_part {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    Some((int_part.to_string(), frac_part.map(str::to_string)))
}

fn split_grouped(body: &str) -> Option<(String, Option<String>)> {
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let mut groups = int_part.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut integer = first.to_string();
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        integer.push_str(group);
    }
    if let Some(f) = frac_part {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    Some((integer, frac_part.map(str::to_string)))
}

fn expand_exponent(
    negative: bool,
    integer: &str,
    fraction: Option<&str>,
    exponent: i64,
) -> Option<Decimal> {
    if !(-MAX_POINT_SHIFT..=MAX_POINT_SHIFT).contains(&exponent) {
        return None;
    }
    let digits = format!("{integer}{}", fraction.unwrap_or(""));
    let point = i64::try_from(integer.len()).ok()?.checked_add(exponent)?;

    let (int_digits, frac_digits) = if point <= 0 {
        let zeros = "0".repeat(usize::try_from(-point).ok()?);
        ("0".to_string(), format!("{zeros}{digits}"))
    } else {
        let point = usize::try_from(point).ok()?;
        if point >= digits.len() {
            let zeros = "0".repeat(point - digits.len());
            (format!("{digits}{zeros}"), String::new())
        } else {
            (digits[..point].to_string(), digits[point..].to_string())
        }
    };

    let int_digits = int_digits.trim_start_matches('0');
    let frac_digits = frac_digits.trim_end_matches('0');
    Some(Decimal {
        negative,
        integer: if int_digits.is_empty() {
            "0".to_string()
        } else {
            int_digits.to_string()
        },
        fraction: (!frac_digits.is_empty()).then(|| frac_digits.to_string()),
    })
}
