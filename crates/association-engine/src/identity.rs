//! Structural keys for concepts in the association graph.
//!
//! A [`NodeIdentity`] is a (category, name) pair whose hash is computed once
//! and cached. [`IdentityRef`] is the borrowed form used when reading names
//! straight out of a snapshot arena; both hash identically, so lookups on the
//! read path never allocate.

use crate::error::IdentityParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Open category code. The named constants are the vocabulary the ingestion
/// side produces; any other code is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category(pub u16);

impl Category {
    pub const ENTITY: Category = Category(0);
    pub const WORD: Category = Category(1);
    pub const NGRAM: Category = Category(2);
    pub const VERSE: Category = Category(3);
    pub const TOPIC: Category = Category(4);
    pub const CHAPTER: Category = Category(5);
    pub const BOOK: Category = Category(6);

    const NAMED: [(Category, &'static str); 7] = [
        (Category::ENTITY, "entity"),
        (Category::WORD, "word"),
        (Category::NGRAM, "ngram"),
        (Category::VERSE, "verse"),
        (Category::TOPIC, "topic"),
        (Category::CHAPTER, "chapter"),
        (Category::BOOK, "book"),
    ];

    pub fn code(self) -> u16 {
        self.0
    }

    /// Vocabulary name, if this code has one.
    pub fn label(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, label)| *label)
    }

    /// Accepts a vocabulary name (case-insensitive) or a raw numeric code.
    pub fn from_label(label: &str) -> Option<Category> {
        let lowered = label.trim().to_lowercase();
        Self::NAMED
            .iter()
            .find(|(_, name)| *name == lowered)
            .map(|(category, _)| *category)
            .or_else(|| lowered.parse::<u16>().ok().map(Category))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Hash shared by the owned and borrowed identity forms.
pub(crate) fn identity_hash(category: Category, name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    category.0.hash(&mut hasher);
    name.hash(&mut hasher);
    hasher.finish()
}

/// Immutable concept key. Cloning is cheap (the name is shared).
#[derive(Clone)]
pub struct NodeIdentity {
    category: Category,
    name: Arc<str>,
    hash: u64,
}

impl NodeIdentity {
    pub fn new(category: Category, name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let hash = identity_hash(category, &name);
        Self {
            category,
            name,
            hash,
        }
    }

    pub fn word(name: &str) -> Self {
        Self::new(Category::WORD, name)
    }

    pub fn entity(name: &str) -> Self {
        Self::new(Category::ENTITY, name)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cached structural hash.
    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    pub fn borrowed(&self) -> IdentityRef<'_> {
        IdentityRef {
            category: self.category,
            name: &self.name,
            hash: self.hash,
        }
    }
}

impl PartialEq for NodeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.category == other.category && self.name == other.name
    }
}

impl Eq for NodeIdentity {}

impl Hash for NodeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for NodeIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Category first, then name. This is the order snapshots are written in.
impl Ord for NodeIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentity({}:{})", self.category, self.name)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

impl FromStr for NodeIdentity {
    type Err = IdentityParseError;

    /// Parses `category:name`. Only the first ':' separates, so names such
    /// as `verse:1-ne 1:1` keep their own colons.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (label, name) = text
            .split_once(':')
            .ok_or_else(|| IdentityParseError::MissingSeparator(text.to_string()))?;
        let category = Category::from_label(label)
            .ok_or_else(|| IdentityParseError::UnknownCategory(label.to_string()))?;
        Ok(NodeIdentity::new(category, name))
    }
}

impl Serialize for NodeIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Borrowed identity, typically pointing into an arena block.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRef<'a> {
    category: Category,
    name: &'a str,
    hash: u64,
}

impl<'a> IdentityRef<'a> {
    pub fn new(category: Category, name: &'a str) -> Self {
        Self {
            category,
            name,
            hash: identity_hash(category, name),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    pub fn to_identity(&self) -> NodeIdentity {
        NodeIdentity {
            category: self.category,
            name: Arc::from(self.name),
            hash: self.hash,
        }
    }
}

impl PartialEq for IdentityRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.category == other.category && self.name == other.name
    }
}

impl Eq for IdentityRef<'_> {}

impl PartialEq<NodeIdentity> for IdentityRef<'_> {
    fn eq(&self, other: &NodeIdentity) -> bool {
        *self == other.borrowed()
    }
}

impl fmt::Display for IdentityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}
