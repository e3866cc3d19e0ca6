use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::io;

/// Root configuration structure for a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    #[serde(default)]
    pub identifier: IdentifierConfig,

    #[serde(default = "default_required_sections")]
    pub required_sections: Vec<String>,

    /// First line every document must start with. `null` disables the check.
    #[serde(default = "default_expected_header")]
    pub expected_header: Option<String>,

    /// Key of the dictionary whose direct children are object definitions.
    #[serde(default = "default_object_table_key")]
    pub object_table_key: String,

    /// Occurrence count above which an identifier is reported as a suspect.
    #[serde(default = "default_occurrence_ceiling")]
    pub occurrence_ceiling: usize,

    /// Identifiers the caller knows (or suspects) to be colliding.
    #[serde(default)]
    pub collisions: Vec<CollisionEntry>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            identifier: IdentifierConfig::default(),
            required_sections: default_required_sections(),
            expected_header: default_expected_header(),
            object_table_key: default_object_table_key(),
            occurrence_ceiling: default_occurrence_ceiling(),
            collisions: Vec::new(),
        }
    }
}

/// Shape of the opaque object identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierConfig {
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default = "default_alphabet")]
    pub alphabet: String,

    /// Upper bound on random draws per minted identifier.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            alphabet: default_alphabet(),
            max_attempts: default_max_attempts(),
        }
    }
}

const FILE_SEPARATOR: &str = "::";

/// One known collision: `id` is shared, and the object labelled `label`
/// is the spurious duplicate that must be re-keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionEntry {
    pub id: String,
    pub label: String,
    /// File associated with the colliding object, for reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CollisionEntry {
    /// Parse the CLI form `ID=LABEL` or `ID=LABEL::FILE`.
    ///
    /// Labels are file and group names and may contain `@` (`Icon@2x.png`),
    /// so the file suffix uses `::`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (id, rest) = spec.split_once('=').ok_or_else(|| {
            Error::validation_invalid_argument(
                "collision",
                format!("Expected ID=LABEL[::FILE], got '{}'", spec),
                None,
                None,
            )
        })?;

        let (label, file) = match rest.split_once(FILE_SEPARATOR) {
            Some((label, file)) if !file.trim().is_empty() => {
                (label, Some(file.trim().to_string()))
            }
            _ => (rest, None),
        };

        let id = id.trim();
        let label = label.trim();
        if id.is_empty() || label.is_empty() {
            return Err(Error::validation_invalid_argument(
                "collision",
                format!("Both ID and LABEL are required, got '{}'", spec),
                None,
                None,
            ));
        }

        Ok(Self {
            id: id.to_string(),
            label: label.to_string(),
            file,
        })
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_required_sections() -> Vec<String> {
    [
        "PBXBuildFile",
        "PBXFileReference",
        "PBXGroup",
        "PBXNativeTarget",
        "PBXProject",
        "PBXSourcesBuildPhase",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_expected_header() -> Option<String> {
    Some("// !$*UTF8*$!".to_string())
}

fn default_object_table_key() -> String {
    "objects".to_string()
}

fn default_occurrence_ceiling() -> usize {
    2
}

fn default_width() -> usize {
    24
}

fn default_alphabet() -> String {
    "0123456789ABCDEF".to_string()
}

fn default_max_attempts() -> usize {
    10_000
}

// =============================================================================
// Loading
// =============================================================================

impl RepairConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = io::read_file(path, &format!("read config {}", path.display()))?;
        let config: RepairConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional path, defaulting when absent.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ident = &self.identifier;

        if ident.width == 0 {
            return Err(Error::config_invalid_value(
                "identifier.width",
                Some("0".to_string()),
                "Width must be at least 1",
            ));
        }

        if ident.alphabet.is_empty()
            || !ident.alphabet.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::config_invalid_value(
                "identifier.alphabet",
                Some(ident.alphabet.clone()),
                "Alphabet must be a non-empty set of ASCII letters and digits",
            ));
        }

        if ident.max_attempts == 0 {
            return Err(Error::config_invalid_value(
                "identifier.max_attempts",
                Some("0".to_string()),
                "At least one attempt is required",
            ));
        }

        if self.object_table_key.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "object_table_key",
                None,
                "Object table key cannot be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_json_yields_defaults() {
        let config: RepairConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.identifier.width, 24);
        assert_eq!(config.identifier.alphabet, "0123456789ABCDEF");
        assert_eq!(config.identifier.max_attempts, 10_000);
        assert_eq!(config.occurrence_ceiling, 2);
        assert_eq!(config.object_table_key, "objects");
        assert!(config.required_sections.contains(&"PBXGroup".to_string()));
        assert!(config.collisions.is_empty());
    }

    #[test]
    fn load_reads_collision_table() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"collisions": [{{"id": "A1000001000000000000001A", "label": "Core", "file": "StreamApp.swift"}}]}}"#
        )
        .unwrap();

        let config = RepairConfig::load(file.path()).unwrap();
        assert_eq!(config.collisions.len(), 1);
        assert_eq!(config.collisions[0].label, "Core");
        assert_eq!(config.collisions[0].file.as_deref(), Some("StreamApp.swift"));
    }

    #[test]
    fn load_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = RepairConfig::load(file.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn validate_rejects_symbol_alphabet() {
        let mut config = RepairConfig::default();
        config.identifier.alphabet = "AB-".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn collision_entry_parses_cli_forms() {
        let entry = CollisionEntry::parse("A1000001000000000000001A=Core").unwrap();
        assert_eq!(entry.id, "A1000001000000000000001A");
        assert_eq!(entry.label, "Core");
        assert_eq!(entry.file, None);

        let entry =
            CollisionEntry::parse("A1000001000000000000001A=Core::StreamApp.swift").unwrap();
        assert_eq!(entry.label, "Core");
        assert_eq!(entry.file.as_deref(), Some("StreamApp.swift"));

        assert!(CollisionEntry::parse("no-separator").is_err());
        assert!(CollisionEntry::parse("=Core").is_err());
    }

    #[test]
    fn collision_label_keeps_scale_suffix() {
        let entry = CollisionEntry::parse("A1000001000000000000001A=Icon@2x.png").unwrap();
        assert_eq!(entry.label, "Icon@2x.png");
        assert_eq!(entry.file, None);

        let entry =
            CollisionEntry::parse("A1000001000000000000001A=Logo@3x.png::Assets/Logo@3x.png")
                .unwrap();
        assert_eq!(entry.label, "Logo@3x.png");
        assert_eq!(entry.file.as_deref(), Some("Assets/Logo@3x.png"));
    }
}
