//! Asset keys
//!
//! A key has the form `<root>:/<relative path>`. Keys are normalized on
//! construction so the string form is the identity: backslashes become `/`,
//! empty and `.` segments are dropped and `..` pops the previous segment.

use crate::error::AssetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the root name and the relative path
pub const ROOT_SEPARATOR: &str = ":/";

/// Normalized asset key
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetKey {
    raw: String,
    split: usize,
}

impl AssetKey {
    /// Parse and normalize a key
    pub fn parse(raw: &str) -> Result<Self, AssetError> {
        let unified = raw.replace('\\', "/");
        let split = unified
            .find(ROOT_SEPARATOR)
            .ok_or_else(|| AssetError::InvalidKey(raw.to_string()))?;

        let root = &unified[..split];
        if root.is_empty() || root.contains('/') {
            return Err(AssetError::InvalidKey(raw.to_string()));
        }

        let relative = normalize_relative(&unified[split + ROOT_SEPARATOR.len()..]);
        Ok(Self::from_parts(root, &relative))
    }

    /// Build a key from an already normalized root and relative path
    pub fn from_parts(root: &str, relative: &str) -> Self {
        let relative = relative.trim_start_matches('/');
        Self {
            raw: format!("{}{}{}", root, ROOT_SEPARATOR, relative),
            split: root.len(),
        }
    }

    /// Full key string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Root (protocol) name
    pub fn root(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Path relative to the root's base directory
    pub fn relative(&self) -> &str {
        &self.raw[self.split + ROOT_SEPARATOR.len()..]
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        let rel = self.relative();
        rel.rsplit('/').next().unwrap_or(rel)
    }

    /// File name without its last extension
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(i) => &name[..i],
        }
    }

    /// Last extension including the leading dot, as written
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(&name[i..]),
        }
    }

    /// Key of the containing directory
    pub fn parent(&self) -> AssetKey {
        let rel = self.relative();
        let parent = rel.rfind('/').map(|i| &rel[..i]).unwrap_or("");
        Self::from_parts(self.root(), parent)
    }

    /// Key of a sibling or child path joined onto this key
    pub fn join(&self, segment: &str) -> AssetKey {
        let joined = if self.relative().is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.relative(), segment)
        };
        Self::from_parts(self.root(), &normalize_relative(&joined))
    }

    /// Key with a suffix appended to the file name
    pub fn with_suffix(&self, suffix: &str) -> AssetKey {
        Self {
            raw: format!("{}{}", self.raw, suffix),
            split: self.split,
        }
    }

    /// Key with the relative path replaced
    pub fn with_relative(&self, relative: &str) -> AssetKey {
        Self::from_parts(self.root(), &normalize_relative(relative))
    }
}

fn normalize_relative(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetKey({})", self.raw)
    }
}

impl FromStr for AssetKey {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AssetKey {
    type Error = AssetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.raw
    }
}

impl AsRef<str> for AssetKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_split() {
        let key = AssetKey::parse("app:/data/textures/wall.png").unwrap();
        assert_eq!(key.root(), "app");
        assert_eq!(key.relative(), "data/textures/wall.png");
        assert_eq!(key.file_name(), "wall.png");
        assert_eq!(key.file_stem(), "wall");
        assert_eq!(key.extension(), Some(".png"));
    }

    #[test]
    fn test_normalization_is_identity() {
        let a = AssetKey::parse("app:/data\\textures//./wall.png").unwrap();
        let b = AssetKey::parse("app:/data/textures/wall.png").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "app:/data/textures/wall.png");

        let c = AssetKey::parse("app:/data/meshes/../textures/wall.png").unwrap();
        assert_eq!(c, b);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(AssetKey::parse("no-root/file.png").is_err());
        assert!(AssetKey::parse(":/data/file.png").is_err());
    }

    #[test]
    fn test_parent_join_suffix() {
        let key = AssetKey::parse("engine:/data/shaders/vs_pbr.sc").unwrap();
        assert_eq!(key.parent().as_str(), "engine:/data/shaders");
        assert_eq!(key.parent().join("common.sh").as_str(), "engine:/data/shaders/common.sh");
        assert_eq!(key.with_suffix(".meta").as_str(), "engine:/data/shaders/vs_pbr.sc.meta");
    }

    #[test]
    fn test_serde_round_trip_uses_string_form() {
        let key = AssetKey::parse("app:/data/a.mat").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"app:/data/a.mat\"");
        let back: AssetKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
