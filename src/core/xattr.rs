//! Extended attribute namespace classification
//!
//! Attribute keys are stored without their namespace prefix; the prefix is
//! replaced by a small numeric type id. Only the `user.`, `trusted.` and
//! `security.` namespaces can be represented.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};

/// Attribute namespace id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum XattrType {
    User = 0,
    Trusted = 1,
    Security = 2,
}

const PREFIXES: [(&str, XattrType); 3] = [
    ("user.", XattrType::User),
    ("trusted.", XattrType::Trusted),
    ("security.", XattrType::Security),
];

impl XattrType {
    pub fn from_id(id: u16) -> Option<Self> {
        PREFIXES.iter().map(|&(_, ty)| ty).find(|&ty| ty as u16 == id)
    }

    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Find the namespace of `key`
///
/// The key must start with a known prefix and have at least one character
/// after it; a bare `"trusted."` is rejected.
pub fn classify(key: &str) -> Result<XattrType> {
    PREFIXES
        .iter()
        .find(|(prefix, _)| key.starts_with(prefix) && key.len() > prefix.len())
        .map(|&(_, ty)| ty)
        .ok_or_else(|| PackError::UnsupportedXattrKey(key.to_string()))
}

/// Namespace prefix for a type, including the trailing dot
pub fn prefix_of(ty: XattrType) -> &'static str {
    match ty {
        XattrType::User => "user.",
        XattrType::Trusted => "trusted.",
        XattrType::Security => "security.",
    }
}

/// Namespace prefix for a raw type id read from an image
pub fn prefix_of_id(id: u16) -> Option<&'static str> {
    XattrType::from_id(id).map(prefix_of)
}
