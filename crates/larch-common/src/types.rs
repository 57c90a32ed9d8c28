//! Attribute type tags for indexed keys.

use serde::{Deserialize, Serialize};

/// Identifier for the type of an indexed attribute.
///
/// The tag is stored in the index meta page so that reopening an index can
/// verify the caller's expectations against what was built. Only `Integer`
/// keys are implemented; the other tags are declared for the on-disk format
/// and rejected at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// 4-byte signed integer key.
    Integer = 0,
    /// 8-byte floating point key.
    Double = 1,
    /// Variable-length character key.
    Varchar = 2,
}

impl AttrType {
    /// Returns the fixed byte size of a key of this type, or None for
    /// variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            AttrType::Integer => Some(4),
            AttrType::Double => Some(8),
            AttrType::Varchar => None,
        }
    }

    /// Decodes a tag byte back into an AttrType.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AttrType::Integer),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::Varchar),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrType::Integer => write!(f, "INTEGER"),
            AttrType::Double => write!(f, "DOUBLE"),
            AttrType::Varchar => write!(f, "VARCHAR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_type_repr() {
        assert_eq!(AttrType::Integer as u8, 0);
        assert_eq!(AttrType::Double as u8, 1);
        assert_eq!(AttrType::Varchar as u8, 2);
    }

    #[test]
    fn test_attr_type_tag_roundtrip() {
        for attr in [AttrType::Integer, AttrType::Double, AttrType::Varchar] {
            assert_eq!(AttrType::from_u8(attr as u8), Some(attr));
        }
        assert_eq!(AttrType::from_u8(99), None);
    }

    #[test]
    fn test_attr_type_fixed_size() {
        assert_eq!(AttrType::Integer.fixed_size(), Some(4));
        assert_eq!(AttrType::Double.fixed_size(), Some(8));
        assert_eq!(AttrType::Varchar.fixed_size(), None);
    }

    #[test]
    fn test_attr_type_display() {
        assert_eq!(AttrType::Integer.to_string(), "INTEGER");
        assert_eq!(AttrType::Double.to_string(), "DOUBLE");
        assert_eq!(AttrType::Varchar.to_string(), "VARCHAR");
    }

    #[test]
    fn test_attr_type_serde_roundtrip() {
        for attr in [AttrType::Integer, AttrType::Double, AttrType::Varchar] {
            let serialized = serde_json::to_string(&attr).unwrap();
            let deserialized: AttrType = serde_json::from_str(&serialized).unwrap();
            assert_eq!(attr, deserialized);
        }
    }
}
