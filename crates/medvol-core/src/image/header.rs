//! Free-form header metadata and the segmentation flag it carries.
//!
//! The segmentation flag is persisted through the reserved `intent_name`
//! key: `medvol_seg` for label masks and `medvol_img` for intensity images.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Reserved header key carrying the segmentation flag.
pub const INTENT_NAME_KEY: &str = "intent_name";
/// `intent_name` value marking a segmentation mask.
pub const SEG_INTENT: &str = "medvol_seg";
/// `intent_name` value marking an intensity image.
pub const IMG_INTENT: &str = "medvol_img";

/// String-to-string header metadata.
///
/// Keys are kept sorted so iteration (and therefore what gets written to disk)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(BTreeMap<String, String>);

impl Header {
    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the header has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Segmentation flag encoded in `intent_name`, if recognised.
    pub fn seg_flag(&self) -> Option<bool> {
        decode_seg_flag(self.get(INTENT_NAME_KEY))
    }

    /// Write the segmentation flag into `intent_name`.
    ///
    /// An unknown flag is written as an intensity image.
    pub fn set_seg_flag(&mut self, is_seg: Option<bool>) {
        self.insert(INTENT_NAME_KEY, encode_seg_flag(is_seg));
    }
}

/// Decode an `intent_name` value into a segmentation flag.
pub fn decode_seg_flag(intent_name: Option<&str>) -> Option<bool> {
    match intent_name {
        Some(SEG_INTENT) => Some(true),
        Some(IMG_INTENT) => Some(false),
        _ => None,
    }
}

/// Encode a segmentation flag as an `intent_name` value.
pub fn encode_seg_flag(is_seg: Option<bool>) -> &'static str {
    match is_seg {
        Some(true) => SEG_INTENT,
        Some(false) | None => IMG_INTENT,
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<HashMap<String, String>> for Header {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Header {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_basic_ops() {
        let mut header = Header::new();
        assert!(header.is_empty());
        assert_eq!(header.insert("descrip", "T1"), None);
        assert_eq!(header.get("descrip"), Some("T1"));
        assert!(header.contains_key("descrip"));
        assert_eq!(header.remove("descrip"), Some("T1".to_string()));
        assert!(header.is_empty());
    }

    #[test]
    fn test_header_iterates_in_key_order() {
        let header: Header = [("b", "2"), ("a", "1")].into_iter().collect();
        let keys: Vec<&str> = header.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_seg_flag_decode() {
        assert_eq!(decode_seg_flag(Some("medvol_seg")), Some(true));
        assert_eq!(decode_seg_flag(Some("medvol_img")), Some(false));
        assert_eq!(decode_seg_flag(Some("fmri")), None);
        assert_eq!(decode_seg_flag(None), None);
    }

    #[test]
    fn test_seg_flag_encode() {
        let mut header = Header::new();
        header.set_seg_flag(Some(true));
        assert_eq!(header.get(INTENT_NAME_KEY), Some(SEG_INTENT));
        header.set_seg_flag(Some(false));
        assert_eq!(header.seg_flag(), Some(false));
        header.set_seg_flag(None);
        assert_eq!(header.get(INTENT_NAME_KEY), Some(IMG_INTENT));
    }
}
