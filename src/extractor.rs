//! The uniform `Extractor` interface every source (CWMP device, generic
//! device API, or a mock in tests) implements, plus the node-construction
//! helpers shared by the concrete extractors in [`crate::cwmp`] and
//! [`crate::generic`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;
use crate::hook::ParameterAttributes;
use crate::node::{Access, DataType, Node};
use crate::validator::coerce;

/// Descriptor published by every extractor, echoed verbatim into comparison
/// reports so a reader can tell which two sources were diffed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_type: String,
    pub identifier: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl SourceInfo {
    pub fn new(source_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            identifier: identifier.into(),
            timestamp: Utc::now(),
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of a full `extract()` run: the nodes that were successfully built,
/// plus the per-path failures (with cause) that degraded rather than aborted
/// the run (§4.3/§4.4). `total_discovered` is the number of leaf paths the
/// run attempted to retrieve, i.e. `nodes.len() + failed.len()`.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub nodes: Vec<Node>,
    pub failed: Vec<(String, CoreError)>,
    pub total_discovered: usize,
}

impl ExtractionOutcome {
    pub fn complete(nodes: Vec<Node>) -> Self {
        let total_discovered = nodes.len();
        Self {
            nodes,
            failed: Vec::new(),
            total_discovered,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_discovered == 0 {
            1.0
        } else {
            self.nodes.len() as f64 / self.total_discovered as f64
        }
    }
}

/// Every source this crate knows how to compare against implements this.
/// `extract` is safe to re-invoke after a failure — implementations must not
/// leave the underlying hook connection in a state that makes a second call
/// fail for reasons other than the source itself being unavailable.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self) -> Result<ExtractionOutcome, CoreError>;

    /// Cheap liveness check. Must not raise except on a programmer error
    /// (e.g. calling it before the extractor is fully constructed).
    async fn validate(&self) -> bool;

    fn source_info(&self) -> SourceInfo;
}

/// One path's raw attributes plus its value, joined by the caller from two
/// separate hook responses before node construction.
pub struct RawParameter {
    pub path: String,
    pub attributes: ParameterAttributes,
    pub value: Option<Value>,
}

/// Build a [`Node`] from a raw retrieved parameter, applying the
/// normalization rules of §4.3 "Node construction": type/access normalization
/// with a fallback to `string`/a caller-supplied default, value coercion that
/// keeps the raw value and warns on failure rather than dropping the node,
/// and `is_object`/`is_custom` flagging. Warnings produced during
/// construction are returned alongside the node rather than logged directly,
/// so callers can decide how to surface them (CWMP vs. generic extractors
/// attribute warnings to different correlation ids).
pub fn build_node(raw: RawParameter, standard_prefixes: &[String]) -> (Node, Vec<String>) {
    let mut warnings = Vec::new();

    let (data_type, type_was_unknown) = DataType::from_xsd(&raw.attributes.data_type);
    if type_was_unknown {
        warnings.push(format!(
            "'{}': unrecognized source type '{}', normalized to string",
            raw.path, raw.attributes.data_type
        ));
    }

    let access = match Access::normalize(&raw.attributes.access) {
        Some(access) => access,
        None => {
            warnings.push(format!(
                "'{}': unrecognized access mode '{}', defaulting to read-only",
                raw.path, raw.attributes.access
            ));
            Access::ReadOnly
        }
    };

    let mut node = Node::new(raw.path.clone(), data_type, access);
    node.description = raw.attributes.description.clone();

    if let Some(value) = raw.value {
        match coerce(data_type, &value) {
            Ok(coerced) => node.value = Some(coerced),
            Err(message) => {
                warnings.push(format!(
                    "'{}': value failed coercion to {data_type}, keeping raw value: {message}",
                    raw.path
                ));
                node.value = Some(value);
            }
        }
    }

    node.mark_custom(
        &standard_prefixes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
    );

    (node, warnings)
}

/// Join a batch of retrieved attribute and value maps into [`RawParameter`]s,
/// one per path in `paths` (paths missing from either map are skipped — a
/// hook that silently drops a path is treated the same as one that errored
/// on it, and the caller's degradation accounting is responsible for noticing
/// the gap).
pub fn join_attributes_and_values(
    paths: &[String],
    mut attributes: FxHashMap<String, ParameterAttributes>,
    mut values: FxHashMap<String, Value>,
) -> Vec<RawParameter> {
    paths
        .iter()
        .filter_map(|path| {
            let attributes = attributes.remove(path)?;
            let value = values.remove(path);
            Some(RawParameter {
                path: path.clone(),
                attributes,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(data_type: &str, access: &str) -> ParameterAttributes {
        ParameterAttributes {
            data_type: data_type.to_string(),
            access: access.to_string(),
            description: None,
        }
    }

    #[test]
    fn build_node_normalizes_type_and_access() {
        let raw = RawParameter {
            path: "Device.WiFi.Radio.1.Channel".to_string(),
            attributes: attrs("xsd:unsignedInt", "readwrite"),
            value: Some(Value::from(6)),
        };
        let (node, warnings) = build_node(raw, &["Device.WiFi.".to_string()]);
        assert_eq!(node.data_type, DataType::UnsignedInt);
        assert_eq!(node.access, Access::ReadWrite);
        assert!(!node.is_custom);
        assert!(warnings.is_empty());
    }

    #[test]
    fn build_node_warns_on_unknown_type_and_access() {
        let raw = RawParameter {
            path: "Device.Vendor.Widget".to_string(),
            attributes: attrs("xsd:weird", "mystery"),
            value: None,
        };
        let (node, warnings) = build_node(raw, &["Device.WiFi.".to_string()]);
        assert_eq!(node.data_type, DataType::String);
        assert_eq!(node.access, Access::ReadOnly);
        assert!(node.is_custom);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn build_node_keeps_raw_value_on_coercion_failure() {
        let raw = RawParameter {
            path: "Device.WiFi.Radio.1.Enable".to_string(),
            attributes: attrs("xsd:boolean", "readwrite"),
            value: Some(Value::String("maybe".to_string())),
        };
        let (node, warnings) = build_node(raw, &["Device.WiFi.".to_string()]);
        assert_eq!(node.value, Some(Value::String("maybe".to_string())));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn join_skips_paths_missing_attributes() {
        let paths = vec!["Device.A".to_string(), "Device.B".to_string()];
        let mut attributes = FxHashMap::default();
        attributes.insert("Device.A".to_string(), attrs("xsd:string", "read"));
        let values = FxHashMap::default();
        let joined = join_attributes_and_values(&paths, attributes, values);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].path, "Device.A");
    }
}
