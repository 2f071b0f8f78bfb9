//! Shared option types that replace boolean flag parameters in the Rust API.

use serde::{Deserialize, Serialize};

/// Controls whether and how provenance snapshots are written after a mutation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceMode {
    /// No provenance graphs are written.
    Disabled,
    /// The mutating call blocks until the snapshot is stored.
    #[default]
    Synchronous,
    /// Snapshots are handed to the background queue and the caller returns immediately.
    Background,
}

impl ProvenanceMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, ProvenanceMode::Disabled)
    }
}

impl From<bool> for ProvenanceMode {
    fn from(value: bool) -> Self {
        if value {
            ProvenanceMode::Synchronous
        } else {
            ProvenanceMode::Disabled
        }
    }
}

/// Ordering guarantee of the background provenance queue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceOrdering {
    /// Jobs are spread across workers; two jobs for the same resource may be reordered.
    #[default]
    Unordered,
    /// Every job for a given resource is handled by the same worker, in submission order.
    PerResource,
}

/// How the Export graph is brought up to date after a member changes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportStrategy {
    /// Always recompute the Export graph from the model and its HasPart members.
    #[default]
    Rebuild,
    /// A newly created member is patched into the Export graph; every other change rebuilds.
    Patch,
}

impl ExportStrategy {
    pub fn allows_patch(self) -> bool {
        matches!(self, ExportStrategy::Patch)
    }
}

/// Whether an Export graph rebuild pulls in the member resource graphs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExportScope {
    ModelOnly,
    WithParts,
}

impl From<bool> for ExportScope {
    fn from(value: bool) -> Self {
        if value {
            ExportScope::WithParts
        } else {
            ExportScope::ModelOnly
        }
    }
}

/// Language selection for derived schema documents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LanguageSelection {
    /// Emit plain strings in a single language.
    Single(String),
    /// Emit per-language maps for every title and description.
    Multilingual,
}

impl LanguageSelection {
    /// Parses `None` or `"*"` as multilingual, anything else as a single language tag.
    pub fn from_request(lang: Option<&str>) -> Self {
        match lang {
            None | Some("*") | Some("") => LanguageSelection::Multilingual,
            Some(l) => LanguageSelection::Single(l.to_ascii_lowercase()),
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            LanguageSelection::Single(l) => Some(l.as_str()),
            LanguageSelection::Multilingual => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_selection() {
        assert_eq!(
            LanguageSelection::from_request(Some("FI")),
            LanguageSelection::Single("fi".to_string())
        );
        assert_eq!(
            LanguageSelection::from_request(None),
            LanguageSelection::Multilingual
        );
        assert_eq!(
            LanguageSelection::from_request(Some("*")),
            LanguageSelection::Multilingual
        );
    }

    #[test]
    fn test_provenance_mode_serde() {
        let mode: ProvenanceMode = serde_json::from_str("\"background\"").unwrap();
        assert_eq!(mode, ProvenanceMode::Background);
        assert!(mode.is_enabled());
        assert!(!ProvenanceMode::from(false).is_enabled());
    }
}
