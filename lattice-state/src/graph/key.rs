//! Node Keys
//!
//! A key names the slot a node occupies under its parent: an array index or
//! an object property. Keys are normalized on the way in so that `"3"` and
//! `3` address the same node.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The property name or array index a node occupies under its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// An array index, or a canonical decimal property name.
    Index(usize),
    /// Any other property name.
    Name(String),
}

/// An ordered sequence of keys, outermost first.
pub type Path = SmallVec<[Key; 4]>;

impl Key {
    /// Parse a raw property name, normalizing canonical decimal strings to
    /// [`Key::Index`].
    ///
    /// `"01"` stays a name, since it would not round-trip through the index.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(index) if index.to_string() == raw => Key::Index(index),
            _ => Key::Name(raw.to_owned()),
        }
    }

    /// The key as an object property name.
    pub fn as_property(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Key::Index(index) => std::borrow::Cow::Owned(index.to_string()),
            Key::Name(name) => std::borrow::Cow::Borrowed(name),
        }
    }

    /// The array index, if this key is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::parse(raw)
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        Key::parse(&raw)
    }
}

impl From<&String> for Key {
    fn from(raw: &String) -> Self {
        Key::parse(raw)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<u32> for Key {
    fn from(index: u32) -> Self {
        Key::Index(index as usize)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        usize::try_from(index)
            .map(Key::Index)
            .unwrap_or_else(|_| Key::Name(index.to_string()))
    }
}

/// Render a path as dotted keys, `""` for the root.
pub fn display_path(path: &[Key]) -> String {
    path.iter()
        .map(Key::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_normalize_to_indices() {
        assert_eq!(Key::parse("3"), Key::Index(3));
        assert_eq!(Key::from("0"), Key::Index(0));
        assert_eq!(Key::from(3usize), Key::from("3"));
    }

    #[test]
    fn non_canonical_numbers_stay_names() {
        assert_eq!(Key::parse("01"), Key::Name("01".into()));
        assert_eq!(Key::parse("-1"), Key::Name("-1".into()));
        assert_eq!(Key::parse("1.5"), Key::Name("1.5".into()));
        assert_eq!(Key::from(-2), Key::Name("-2".into()));
    }

    #[test]
    fn index_keys_address_properties() {
        assert_eq!(Key::Index(7).as_property(), "7");
        assert_eq!(Key::Name("a".into()).as_property(), "a");
    }

    #[test]
    fn paths_render_dotted() {
        let path: Path = smallvec::smallvec![Key::from("items"), Key::from(2usize), Key::from("v")];
        assert_eq!(display_path(&path), "items.2.v");
        assert_eq!(display_path(&[]), "");
    }
}
