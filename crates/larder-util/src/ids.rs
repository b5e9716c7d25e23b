//! Key types for larder

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Characters that may start a channel name
const CHANNEL_PREFIXES: &[char] = &['#', '&', '+', '!'];

/// Fold a name the way IRC servers compare them (RFC 1459 casemapping).
///
/// ASCII letters are lowercased and `[]\~` map to `{}|^`, so `#Foo[1]` and
/// `#foo{1}` name the same channel.
pub fn irc_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Case-insensitive key naming a logical partition of data, usually a channel.
///
/// The original spelling is kept for display and persistence; equality,
/// hashing and ordering use the folded form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChannelKey {
    raw: String,
    folded: String,
}

impl ChannelKey {
    pub fn new(key: impl Into<String>) -> Self {
        let raw = key.into();
        let folded = irc_lower(&raw);
        Self { raw, folded }
    }

    /// The key as it was first spelled
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The case-folded form used for comparisons and directory names
    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Whether this key looks like an IRC channel name
    pub fn is_channel(&self) -> bool {
        match self.raw.chars().next() {
            Some(first) if CHANNEL_PREFIXES.contains(&first) => {
                self.raw.len() > 1
                    && !self
                        .raw
                        .chars()
                        .any(|c| c == ' ' || c == ',' || c == '\x07' || c == '\0')
            }
            _ => false,
        }
    }
}

impl PartialEq for ChannelKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for ChannelKey {}

impl Hash for ChannelKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for ChannelKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChannelKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<String> for ChannelKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ChannelKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ChannelKey> for String {
    fn from(key: ChannelKey) -> Self {
        key.raw
    }
}

/// Identifier of a record within one channel.
///
/// Numeric ids (user ids) are stored as integers; anything else, such as a
/// nick, is kept verbatim. Integers sort before names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Name(String),
}

impl RecordId {
    /// Coerce a persisted field into an id
    pub fn parse(field: &str) -> Self {
        match field.trim().parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Name(field.to_string()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Name(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for RecordId {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u32> for RecordId {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn channel_key_is_case_insensitive() {
        let a = ChannelKey::new("#Rust");
        let b = ChannelKey::new("#rust");
        let c = ChannelKey::new("#python");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        // Original spelling survives
        assert_eq!(a.as_str(), "#Rust");
        assert_eq!(a.folded(), "#rust");
    }

    #[test]
    fn channel_key_folds_rfc1459_specials() {
        assert_eq!(ChannelKey::new("#Foo[1]"), ChannelKey::new("#foo{1}"));
        assert_eq!(ChannelKey::new("#a\\b~"), ChannelKey::new("#A|B^"));
    }

    #[test]
    fn channel_detection() {
        assert!(ChannelKey::new("#rust").is_channel());
        assert!(ChannelKey::new("&local").is_channel());
        assert!(!ChannelKey::new("nick").is_channel());
        assert!(!ChannelKey::new("#").is_channel());
        assert!(!ChannelKey::new("#has space").is_channel());
    }

    #[test]
    fn channel_key_serializes_original_spelling() {
        let key = ChannelKey::new("#Rust");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"#Rust\"");
        let parsed: ChannelKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_str(), "#Rust");
    }

    #[test]
    fn record_id_coercion() {
        assert_eq!(RecordId::parse("42"), RecordId::Int(42));
        assert_eq!(RecordId::parse("-7"), RecordId::Int(-7));
        assert_eq!(RecordId::parse("jemfinch"), RecordId::Name("jemfinch".into()));
        assert_eq!(RecordId::parse("12abc"), RecordId::Name("12abc".into()));
    }

    #[test]
    fn record_ids_sort_numbers_before_names() {
        let mut ids = vec![
            RecordId::Name("bob".into()),
            RecordId::Int(10),
            RecordId::Name("alice".into()),
            RecordId::Int(2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                RecordId::Int(2),
                RecordId::Int(10),
                RecordId::Name("alice".into()),
                RecordId::Name("bob".into()),
            ]
        );
    }
}
