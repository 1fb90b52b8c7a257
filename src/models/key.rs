//! Object keys and the byte-level helpers used to bound key ranges.
//!
//! Keys are opaque byte strings compared byte-lexicographically. The
//! delimiter only matters to the listing layer, storage never looks at it.

use std::fmt;

/// Byte that splits keys into pseudo-directory segments.
pub const DELIMITER: u8 = b'/';

/// Longest key, prefix or cursor key accepted by the metabase.
pub const MAX_KEY_LENGTH: usize = 1024;

/// An object key within a bucket.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(Vec<u8>);

impl ObjectKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &ObjectKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the remainder of the key after `prefix`, or `None` when the
    /// key lies outside the prefix.
    pub fn strip_prefix(&self, prefix: &ObjectKey) -> Option<ObjectKey> {
        self.0.strip_prefix(prefix.0.as_slice()).map(ObjectKey::new)
    }

    /// Position of the first delimiter byte.
    pub fn find_delimiter(&self) -> Option<usize> {
        self.0.iter().position(|&b| b == DELIMITER)
    }

    /// The first `len` bytes of the key.
    pub fn truncated(&self, len: usize) -> ObjectKey {
        ObjectKey::new(&self.0[..len.min(self.0.len())])
    }

    /// `self` followed by `suffix`.
    pub fn join(&self, suffix: &ObjectKey) -> ObjectKey {
        let mut bytes = Vec::with_capacity(self.0.len() + suffix.0.len());
        bytes.extend_from_slice(&self.0);
        bytes.extend_from_slice(&suffix.0);
        ObjectKey(bytes)
    }
}

impl From<Vec<u8>> for ObjectKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ObjectKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.as_bytes().to_vec())
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key.into_bytes())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

/// Smallest key of the same length that sorts after every key starting
/// with `key`: `"ab"` becomes `"ac"`.
///
/// Trailing `0xFF` bytes cannot be incremented and are dropped before the
/// increment. An empty result means "no upper bound", which is also what an
/// empty input produces.
pub fn next_prefix(key: &ObjectKey) -> ObjectKey {
    let mut after = key.0.clone();
    while let Some(last) = after.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return ObjectKey(after);
        }
        after.pop();
    }
    ObjectKey::default()
}

/// A key sorting just before `key`: `"ab"` becomes `"aa\xFF"`.
///
/// A trailing zero byte is simply dropped, since `"a"` is the greatest key
/// below `"a\x00"`. Empty input stays empty.
pub fn before_key(key: &ObjectKey) -> ObjectKey {
    let mut before = key.0.clone();
    match before.pop() {
        None => ObjectKey::default(),
        Some(0) => ObjectKey(before),
        Some(last) => {
            before.push(last - 1);
            before.push(0xFF);
            ObjectKey(before)
        }
    }
}

/// Whether `a` sorts strictly before `b`.
pub fn less_key(a: &ObjectKey, b: &ObjectKey) -> bool {
    a.0 < b.0
}
