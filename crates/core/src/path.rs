//! Dotted/indexed field paths such as `emergencyContact.phone` or `skills[2]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A path identifying a field inside a record.
///
/// Paths always start with a key. Top-level fields are single-segment
/// paths; nested fields add `.key` or `[index]` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a path string.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let invalid = |message: &str| PathError::Invalid {
            path: input.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        for part in input.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(invalid("empty key"));
            }
            if name.contains(']') {
                return Err(invalid("unexpected ']'"));
            }
            segments.push(Segment::Key(name.to_string()));

            while !rest.is_empty() {
                let Some(open) = rest.strip_prefix('[') else {
                    return Err(invalid("expected '[' after index"));
                };
                let Some(end) = open.find(']') else {
                    return Err(invalid("unclosed '['"));
                };
                let digits = &open[..end];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid("index must be a non-negative integer"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| invalid("index out of range"))?;
                segments.push(Segment::Index(index));
                rest = &open[end + 1..];
            }
        }

        Ok(FieldPath { segments })
    }

    /// A single-segment path for a top-level field. The name is taken
    /// literally, dots and brackets included.
    pub fn key(name: impl Into<String>) -> Self {
        FieldPath {
            segments: vec![Segment::Key(name.into())],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The top-level field this path lives under.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Key(key)) => key,
            _ => "",
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        FieldPath { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        FieldPath { segments }
    }

    /// The enclosing path, or `None` for a top-level field.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(FieldPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// True if one path is a prefix of the other.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        FieldPath::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_and_indexed_paths() {
        let path = FieldPath::parse("emergencyContact.phone").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("emergencyContact".into()),
                Segment::Key("phone".into())
            ]
        );

        let path = FieldPath::parse("skills[2]").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("skills".into()), Segment::Index(2)]
        );

        let path = FieldPath::parse("contacts[0].phones[1].number").unwrap();
        assert_eq!(path.segments().len(), 5);
        assert_eq!(path.root(), "contacts");
        assert_eq!(path.to_string(), "contacts[0].phones[1].number");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "a.", ".a", "a..b", "a[", "a[x]", "a[]", "a[1]b", "[0]", "a]"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(PathError::Invalid { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn prefix_relationships() {
        let address = FieldPath::parse("address").unwrap();
        let state = FieldPath::parse("address.state").unwrap();
        let other = FieldPath::parse("addressLine").unwrap();

        assert!(address.is_prefix_of(&state));
        assert!(address.is_prefix_of(&address));
        assert!(!state.is_prefix_of(&address));
        assert!(!address.is_prefix_of(&other));
        assert!(state.overlaps(&address));
        assert_eq!(state.parent(), Some(address));
    }

    #[test]
    fn deserializes_from_string() {
        let paths: Vec<FieldPath> = serde_json::from_str(r#"["stateId", "skills[1]"]"#).unwrap();
        assert_eq!(paths[1], FieldPath::key("skills").index(1));
        assert!(serde_json::from_str::<FieldPath>(r#""a..b""#).is_err());
    }
}
