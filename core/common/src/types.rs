//! Common types used throughout DriveGate.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// A client-facing path, independent of the remote object graph.
///
/// Segments are always non-empty and already percent-decoded, so
/// `/docs//My%20File.txt/` and `docs/My File.txt` describe the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrivePath {
    components: Vec<String>,
}

impl DrivePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a raw URL path.
    ///
    /// Splits on '/', drops empty segments and percent-decodes what is
    /// left. Parsing never fails; an empty result is the root.
    pub fn parse(path: &str) -> Self {
        let components = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .filter(|segment| !segment.is_empty())
            .collect();

        Self { components }
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Split into the containing folder and the leaf name.
    ///
    /// Returns `None` for the root, which has no leaf.
    pub fn split_leaf(&self) -> Option<(Self, String)> {
        let (leaf, folders) = self.components.split_last()?;
        Some((
            Self {
                components: folders.to_vec(),
            },
            leaf.clone(),
        ))
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for DrivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Credential material that must never show up in logs.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}
