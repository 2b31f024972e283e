//! Composite field mappings and fixed-length value arithmetic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved separator between component values, the maximal character
pub const DEFAULT_SEPARATOR: char = '\u{10FFFF}';

/// A synthetic indexed field built from ordered component fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeMapping {
    /// Composite field name
    pub name: String,
    /// Component fields in concatenation order
    pub components: Vec<String>,
    /// Separator between component values
    #[serde(default = "default_separator")]
    pub separator: char,
    /// Data before this instant used the legacy, non-composite encoding
    #[serde(default)]
    pub transition_date: Option<DateTime<Utc>>,
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

impl CompositeMapping {
    pub fn new<I, S>(name: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            components: components.into_iter().map(Into::into).collect(),
            separator: DEFAULT_SEPARATOR,
            transition_date: None,
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_transition_date(mut self, date: DateTime<Utc>) -> Self {
        self.transition_date = Some(date);
        self
    }

    /// The composite name is also its first component, so the same field
    /// holds both plain legacy values and composite values
    pub fn is_overloaded(&self) -> bool {
        self.components.first() == Some(&self.name)
    }

    /// Position of a field among the components
    pub fn position(&self, field: &str) -> Option<usize> {
        self.components.iter().position(|c| c == field)
    }

    /// Returns true when the queried period reaches back before the
    /// transition date, or its start is unknown
    pub fn includes_legacy_data(&self, begin_date: Option<DateTime<Utc>>) -> bool {
        match (self.transition_date, begin_date) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(transition), Some(begin)) => begin < transition,
        }
    }

    /// Joins component values with the separator
    pub fn join<S: AsRef<str>>(&self, values: &[S]) -> String {
        let mut out = String::new();
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(self.separator);
            }
            out.push_str(v.as_ref());
        }
        out
    }
}

/// Character set of a fixed-length encoded field
///
/// Values of a fixed-length field all have the same width, so they behave as
/// base-N integers over the alphabet and can be incremented or decremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alphabet {
    /// `0-9a-f`
    Hex,
    /// `0-9`
    Decimal,
    /// `a-z`
    LowerAlpha,
    /// Printable ASCII, space through tilde
    Ascii,
}

impl Alphabet {
    fn bounds(&self) -> &'static [(char, char)] {
        match self {
            Alphabet::Hex => &[('0', '9'), ('a', 'f')],
            Alphabet::Decimal => &[('0', '9')],
            Alphabet::LowerAlpha => &[('a', 'z')],
            Alphabet::Ascii => &[(' ', '~')],
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.bounds().iter().any(|(lo, hi)| (*lo..=*hi).contains(&c))
    }

    fn min(&self) -> char {
        self.bounds()[0].0
    }

    fn max(&self) -> char {
        self.bounds()[self.bounds().len() - 1].1
    }

    fn successor(&self, c: char) -> Option<char> {
        let ranges = self.bounds();
        for (i, (lo, hi)) in ranges.iter().enumerate() {
            if (*lo..=*hi).contains(&c) {
                if c < *hi {
                    return char::from_u32(c as u32 + 1);
                }
                return ranges.get(i + 1).map(|(next_lo, _)| *next_lo);
            }
        }
        None
    }

    fn predecessor(&self, c: char) -> Option<char> {
        let ranges = self.bounds();
        for (i, (lo, hi)) in ranges.iter().enumerate() {
            if (*lo..=*hi).contains(&c) {
                if c > *lo {
                    return char::from_u32(c as u32 - 1);
                }
                return i.checked_sub(1).map(|prev| ranges[prev].1);
            }
        }
        None
    }

    /// Next value of the same width
    ///
    /// `None` when the value overflows or holds characters outside the
    /// alphabet.
    pub fn increment(&self, value: &str) -> Option<String> {
        let mut chars: Vec<char> = value.chars().collect();
        if chars.is_empty() || !chars.iter().all(|c| self.contains(*c)) {
            return None;
        }
        for i in (0..chars.len()).rev() {
            match self.successor(chars[i]) {
                Some(next) => {
                    chars[i] = next;
                    return Some(chars.into_iter().collect());
                }
                None => chars[i] = self.min(),
            }
        }
        None
    }

    /// Previous value of the same width
    ///
    /// `None` when the value underflows or holds characters outside the
    /// alphabet.
    pub fn decrement(&self, value: &str) -> Option<String> {
        let mut chars: Vec<char> = value.chars().collect();
        if chars.is_empty() || !chars.iter().all(|c| self.contains(*c)) {
            return None;
        }
        for i in (0..chars.len()).rev() {
            match self.predecessor(chars[i]) {
                Some(prev) => {
                    chars[i] = prev;
                    return Some(chars.into_iter().collect());
                }
                None => chars[i] = self.max(),
            }
        }
        None
    }
}
