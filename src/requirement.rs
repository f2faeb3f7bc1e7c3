//! Operator-requirement manager: loads and saves a declarative node list
//! (§4.5), the persistent "what the operator expects a device to implement"
//! document consumed by [`crate::enhanced`].
//!
//! Format detection follows the rest of this crate's document-handling
//! style: the file extension decides first, and content sniffing (first
//! non-whitespace byte) is the fallback when the extension is absent or
//! ambiguous — the same two-tier approach `wg-bastion`'s policy loader uses
//! for its own config documents, minus the TOML branch this format doesn't
//! need.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, ErrorContext};
use crate::node::Node;
use crate::validator::{validate_path, validate_range};

/// On-disk shape of a requirement document: a single `nodes` array, per §6.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequirementDocument {
    pub nodes: Vec<Node>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Content sniff used when the extension is missing or unrecognized:
    /// a requirement document's first non-whitespace byte is `{` for JSON;
    /// anything else is treated as YAML, which is a superset of JSON-object
    /// syntax anyway.
    fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{') => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Loads, validates, and atomically writes back [`RequirementDocument`]s.
pub struct RequirementLoader;

impl RequirementLoader {
    /// Load a requirement document from `path`, validating every node on
    /// the way in (§4.5): unique paths, syntactic path validity with
    /// `{i}` templates permitted, and well-formed `value_range`/`data_type`.
    pub fn load(path: impl AsRef<Path>) -> Result<RequirementDocument, CoreError> {
        let path = path.as_ref();
        let context = || ErrorContext::new("requirement.load", "requirement_loader");
        let content = std::fs::read_to_string(path).map_err(|err| {
            CoreError::configuration(
                format!("failed to read requirement document '{}': {err}", path.display()),
                context(),
            )
        })?;

        let format = DocumentFormat::from_extension(path).unwrap_or_else(|| DocumentFormat::sniff(&content));
        let document = Self::parse(&content, format)?;
        Self::validate(&document)?;
        Ok(document)
    }

    fn parse(content: &str, format: DocumentFormat) -> Result<RequirementDocument, CoreError> {
        let context = || ErrorContext::new("requirement.parse", "requirement_loader");
        match format {
            DocumentFormat::Json => serde_json::from_str(content).map_err(|err| {
                CoreError::configuration(format!("invalid JSON requirement document: {err}"), context())
            }),
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|err| {
                CoreError::configuration(format!("invalid YAML requirement document: {err}"), context())
            }),
        }
    }

    /// Validate a loaded (or in-memory) document: unique paths, syntactic
    /// path validity (templates allowed), known `data_type` (enforced by
    /// deserialization itself), and well-formed `value_range`.
    pub fn validate(document: &RequirementDocument) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(document.nodes.len());
        for node in &document.nodes {
            if !seen.insert(node.path.as_str()) {
                return Err(CoreError::validation(
                    format!("duplicate path '{}' in requirement document", node.path),
                    ErrorContext::new("requirement.validate", "requirement_loader"),
                ));
            }

            validate_path(&node.path, node.is_object, true).map_err(|message| {
                CoreError::validation(
                    format!("'{}': {message}", node.path),
                    ErrorContext::new("requirement.validate", "requirement_loader"),
                )
            })?;

            if let (Some(value), Some(range)) = (&node.value, &node.value_range) {
                validate_range(node.data_type, value, range).map_err(|message| {
                    CoreError::validation(
                        format!("'{}': {message}", node.path),
                        ErrorContext::new("requirement.validate", "requirement_loader"),
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Write `document` back to `path`, preserving whatever format the
    /// extension implies (defaulting to JSON when the extension is
    /// unrecognized — a fresh document has no prior content to sniff).
    /// The write is atomic: content is staged to a sibling temp file and
    /// renamed into place, so a crash mid-write never leaves a partial
    /// document at `path`.
    pub fn save(document: &RequirementDocument, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        let context = || ErrorContext::new("requirement.save", "requirement_loader");
        let format = DocumentFormat::from_extension(path).unwrap_or(DocumentFormat::Json);

        let rendered = match format {
            DocumentFormat::Json => serde_json::to_string_pretty(document).map_err(|err| {
                CoreError::configuration(format!("failed to serialize requirement document: {err}"), context())
            })?,
            DocumentFormat::Yaml => serde_yaml::to_string(document).map_err(|err| {
                CoreError::configuration(format!("failed to serialize requirement document: {err}"), context())
            })?,
        };

        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let temp_path = parent.join(format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("requirement"),
            uuid::Uuid::new_v4()
        ));

        std::fs::write(&temp_path, rendered).map_err(|err| {
            CoreError::configuration(format!("failed to stage requirement document write: {err}"), context())
        })?;
        std::fs::rename(&temp_path, path).map_err(|err| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::configuration(format!("failed to finalize requirement document write: {err}"), context())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Access, DataType};
    use tempfile::tempdir;

    fn sample_document() -> RequirementDocument {
        RequirementDocument {
            nodes: vec![
                Node::new(
                    "Device.WiFi.Radio.1.Channel",
                    DataType::UnsignedInt,
                    Access::ReadWrite,
                ),
                Node::new(
                    "Device.WiFi.Radio.{i}.Enable",
                    DataType::Boolean,
                    Access::ReadWrite,
                ),
            ],
        }
    }

    #[test]
    fn validate_rejects_duplicate_paths() {
        let mut document = sample_document();
        document.nodes.push(document.nodes[0].clone());
        let err = RequirementLoader::validate(&document).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);
    }

    #[test]
    fn validate_allows_template_placeholders() {
        let document = sample_document();
        assert!(RequirementLoader::validate(&document).is_ok());
    }

    #[test]
    fn round_trip_through_json_is_byte_stable_after_canonicalization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirement.json");
        let document = sample_document();

        RequirementLoader::save(&document, &path).unwrap();
        let first_load = RequirementLoader::load(&path).unwrap();
        RequirementLoader::save(&first_load, &path).unwrap();
        let second_load = RequirementLoader::load(&path).unwrap();

        assert_eq!(first_load.nodes, second_load.nodes);
    }

    #[test]
    fn round_trip_through_yaml_preserves_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirement.yaml");
        let yaml = r#"
nodes:
  - path: Device.WiFi.Radio.1.Channel
    data_type: unsignedInt
    access: read-write
    vendor_note: keep-me
"#;
        std::fs::write(&path, yaml).unwrap();
        let document = RequirementLoader::load(&path).unwrap();
        assert_eq!(document.nodes[0].extra_fields["vendor_note"], "keep-me");

        RequirementLoader::save(&document, &path).unwrap();
        let reloaded = RequirementLoader::load(&path).unwrap();
        assert_eq!(reloaded.nodes[0].extra_fields["vendor_note"], "keep-me");
    }

    #[test]
    fn sniffs_format_when_extension_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirement");
        std::fs::write(&path, serde_json::to_string(&sample_document()).unwrap()).unwrap();
        let document = RequirementLoader::load(&path).unwrap();
        assert_eq!(document.nodes.len(), 2);
    }
}
