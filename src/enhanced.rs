//! The enhanced comparison engine (§4.8): [`crate::comparator::compare`] plus
//! per-node validation against the declared side's constraints, and —
//! when a live [`Hook`] is supplied — event subscription and function
//! invocation conformance probing. This is composition over the base
//! comparison engine, not subclassing (§9 design notes).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::comparator::{ComparisonReport, compare};
use crate::extractor::SourceInfo;
use crate::hook::Hook;
use crate::node::{DataType, Node, ValueRange};
use crate::validator::{SourceOrigin, ValidationResult, Validator};

/// Outcome of probing a single declared event against a live hook.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventTestResult {
    pub event_name: String,
    pub path: String,
    pub subscribed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of invoking a single declared function against a live hook, with
/// the synthesized inputs used and whether the response covered every
/// declared output parameter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionTestResult {
    pub function_name: String,
    pub path: String,
    pub inputs: FxHashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<FxHashMap<String, Value>>,
    pub conforms: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Superset of [`ComparisonReport`]: validation findings per path plus
/// optional event/function conformance probes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnhancedComparisonReport {
    pub comparison: ComparisonReport,
    pub validation_results: FxHashMap<String, ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_test_results: Option<Vec<EventTestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_test_results: Option<Vec<FunctionTestResult>>,
}

/// Synthesize a deterministic input value for a declared input parameter
/// from its `data_type`/`value_range` (§4.8 "Input synthesis strategy",
/// resolving Open Question 2). Fixed rules, not random, so function-test
/// results reproduce across runs: numeric types use `min` if present else
/// `0`; `boolean` is `false`; `string` is `""` unless a `pattern` is
/// present, in which case its literal (non-metacharacter) prefix is used;
/// `dateTime` is the Unix epoch; `base64`/`hexBinary` are the empty
/// encoding.
pub fn synthesize_input(data_type: DataType, range: Option<&ValueRange>) -> Value {
    match data_type {
        DataType::Int | DataType::Long => {
            let min = range.and_then(|r| r.min).unwrap_or(0.0);
            Value::from(min as i64)
        }
        DataType::UnsignedInt | DataType::UnsignedLong => {
            let min = range.and_then(|r| r.min).unwrap_or(0.0).max(0.0);
            Value::from(min as u64)
        }
        DataType::Boolean => Value::Bool(false),
        DataType::String => match range.and_then(|r| r.pattern.as_deref()) {
            Some(pattern) => Value::String(regex_literal_prefix(pattern)),
            None => Value::String(String::new()),
        },
        DataType::DateTime => Value::String("1970-01-01T00:00:00Z".to_string()),
        DataType::Base64 | DataType::HexBinary => Value::String(String::new()),
    }
}

/// The literal (non-metacharacter) characters at the start of a regex
/// pattern, e.g. `"abc.*"` → `"abc"`. Used to pick a string synthesized for
/// a `pattern`-constrained input that plausibly matches it, without
/// implementing a general regex generator.
fn regex_literal_prefix(pattern: &str) -> String {
    const METACHARACTERS: [char; 12] = ['\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']'];
    pattern
        .chars()
        .take_while(|c| !METACHARACTERS.contains(c))
        .collect()
}

fn index_by_path(nodes: &[Node]) -> FxHashMap<&str, &Node> {
    nodes.iter().map(|n| (n.path.as_str(), n)).collect()
}

/// Run the enhanced comparison: the base diff between `declared_nodes`
/// (typically an operator requirement) and `device_nodes`, per-path
/// validation of the device's actual value against the declared
/// constraints, and — when `live_hook` is supplied — event/function
/// conformance probes declared on `declared_nodes`.
#[allow(clippy::too_many_arguments)]
pub async fn compare_enhanced(
    source1: SourceInfo,
    source2: SourceInfo,
    declared_nodes: &[Node],
    device_nodes: &[Node],
    validator: &Validator,
    origin: SourceOrigin,
    live_hook: Option<Arc<dyn Hook>>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
) -> EnhancedComparisonReport {
    let comparison = compare(source1, source2, declared_nodes, device_nodes, started_at, duration_ms);

    let device_index = index_by_path(device_nodes);
    let mut validation_results = FxHashMap::default();
    for declared in declared_nodes {
        let Some(device_node) = device_index.get(declared.path.as_str()) else {
            continue;
        };
        let mut candidate = declared.clone();
        candidate.value = device_node.value.clone();
        let result = validator.validate_node(&candidate, origin);
        validation_results.insert(declared.path.clone(), result);
    }

    // Synthesis looks up input-parameter paths against whichever side
    // declares them; declared_nodes takes precedence since it's the source
    // of the constraint (a requirement's own parameter list), falling back
    // to the device's actual attributes when the requirement only lists
    // the parameter path without redeclaring its type.
    let declared_index = index_by_path(declared_nodes);
    let lookup = |path: &str| -> Option<&Node> {
        declared_index.get(path).copied().or_else(|| device_index.get(path).copied())
    };

    let mut event_test_results = None;
    let mut function_test_results = None;

    if let Some(hook) = live_hook {
        let mut events = Vec::new();
        let mut functions = Vec::new();

        for node in declared_nodes {
            if let Some(descriptors) = &node.events {
                for event in descriptors {
                    let outcome = hook.subscribe_to_event(&event.path).await;
                    let (subscribed, error) = match outcome {
                        Ok(ok) => (ok, None),
                        Err(err) => (false, Some(err.to_string())),
                    };
                    events.push(EventTestResult {
                        event_name: event.name.clone(),
                        path: event.path.clone(),
                        subscribed,
                        error,
                    });
                }
            }

            if let Some(descriptors) = &node.functions {
                for function in descriptors {
                    let inputs: FxHashMap<String, Value> = function
                        .input_parameters
                        .iter()
                        .map(|param_path| {
                            let value = match lookup(param_path) {
                                Some(param_node) => {
                                    synthesize_input(param_node.data_type, param_node.value_range.as_ref())
                                }
                                None => synthesize_input(DataType::String, None),
                            };
                            (param_path.clone(), value)
                        })
                        .collect();

                    let outcome = hook.call_function(&function.path, &inputs).await;
                    let (outputs, conforms, error) = match outcome {
                        Ok(outputs) => {
                            let conforms = function
                                .output_parameters
                                .iter()
                                .all(|expected| outputs.contains_key(expected));
                            (Some(outputs), conforms, None)
                        }
                        Err(err) => (None, false, Some(err.to_string())),
                    };

                    functions.push(FunctionTestResult {
                        function_name: function.name.clone(),
                        path: function.path.clone(),
                        inputs,
                        outputs,
                        conforms,
                        error,
                    });
                }
            }
        }

        event_test_results = Some(events);
        function_test_results = Some(functions);
    }

    EnhancedComparisonReport {
        comparison,
        validation_results,
        event_test_results,
        function_test_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoreError;
    use crate::hook::{DeviceConfig, ParameterAttributes};
    use crate::node::{Access, EventDescriptor, FunctionDescriptor};
    use async_trait::async_trait;
    use serde_json::json;

    fn info(id: &str) -> SourceInfo {
        SourceInfo::new("test", id)
    }

    #[test]
    fn synthesize_input_uses_declared_min_and_pattern_prefix() {
        let range = ValueRange {
            min: Some(5.0),
            ..Default::default()
        };
        assert_eq!(synthesize_input(DataType::Int, Some(&range)), json!(5));

        let pattern_range = ValueRange {
            pattern: Some("abc.*".to_string()),
            ..Default::default()
        };
        assert_eq!(
            synthesize_input(DataType::String, Some(&pattern_range)),
            json!("abc")
        );

        assert_eq!(synthesize_input(DataType::Boolean, None), json!(false));
        assert_eq!(synthesize_input(DataType::DateTime, None), json!("1970-01-01T00:00:00Z"));
    }

    // S2 — channel out of [1, 11], declared via the requirement side.
    #[tokio::test]
    async fn range_mismatch_surfaces_as_a_validation_error() {
        let mut requirement_node = Node::new(
            "Device.WiFi.Radio.1.Channel",
            DataType::UnsignedInt,
            Access::ReadWrite,
        );
        requirement_node.value_range = Some(ValueRange {
            min: Some(1.0),
            max: Some(11.0),
            ..Default::default()
        });
        let declared = vec![requirement_node];

        let mut device_node = Node::new(
            "Device.WiFi.Radio.1.Channel",
            DataType::UnsignedInt,
            Access::ReadWrite,
        );
        device_node.value = Some(json!(13));
        let device = vec![device_node];

        let validator = Validator::default();
        let report = compare_enhanced(
            info("requirement"),
            info("device"),
            &declared,
            &device,
            &validator,
            SourceOrigin::Strict,
            None,
            Utc::now(),
            0,
        )
        .await;

        let result = &report.validation_results["Device.WiFi.Radio.1.Channel"];
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("below minimum") || result.errors[0].message.contains("above maximum"));
    }

    struct ProbeHook;

    #[async_trait]
    impl Hook for ProbeHook {
        async fn connect(&self, _config: &DeviceConfig) -> Result<(), CoreError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn get_parameter_names(&self, _prefix: &str) -> Result<Vec<String>, CoreError> {
            Ok(vec![])
        }
        async fn get_parameter_values(
            &self,
            _paths: &[String],
        ) -> Result<rustc_hash::FxHashMap<String, Value>, CoreError> {
            Ok(rustc_hash::FxHashMap::default())
        }
        async fn get_parameter_attributes(
            &self,
            _paths: &[String],
        ) -> Result<rustc_hash::FxHashMap<String, ParameterAttributes>, CoreError> {
            Ok(rustc_hash::FxHashMap::default())
        }
        async fn set_parameter_values(
            &self,
            _values: &rustc_hash::FxHashMap<String, Value>,
        ) -> Result<(), CoreError> {
            Ok(())
        }
        async fn subscribe_to_event(&self, path: &str) -> Result<bool, CoreError> {
            Ok(path == "Device.WiFi.Radio.1.ChannelChangeEvent")
        }
        async fn call_function(
            &self,
            _path: &str,
            _inputs: &rustc_hash::FxHashMap<String, Value>,
        ) -> Result<rustc_hash::FxHashMap<String, Value>, CoreError> {
            let mut outputs = rustc_hash::FxHashMap::default();
            outputs.insert("Status".to_string(), json!("OK"));
            Ok(outputs)
        }
    }

    #[tokio::test]
    async fn event_and_function_probes_are_aggregated_not_aborting() {
        let mut node = Node::new("Device.WiFi.Radio.1.", DataType::String, Access::ReadOnly);
        node.events = Some(vec![EventDescriptor {
            name: "ChannelChange".to_string(),
            path: "Device.WiFi.Radio.1.ChannelChangeEvent".to_string(),
            parameters: vec![],
        }]);
        node.functions = Some(vec![FunctionDescriptor {
            name: "Reset".to_string(),
            path: "Device.WiFi.Radio.1.Reset()".to_string(),
            input_parameters: vec![],
            output_parameters: vec!["Status".to_string()],
        }]);
        let declared = vec![node];

        let validator = Validator::default();
        let report = compare_enhanced(
            info("requirement"),
            info("device"),
            &declared,
            &[],
            &validator,
            SourceOrigin::Strict,
            Some(Arc::new(ProbeHook)),
            Utc::now(),
            0,
        )
        .await;

        let events = report.event_test_results.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].subscribed);

        let functions = report.function_test_results.unwrap();
        assert_eq!(functions.len(), 1);
        assert!(functions[0].conforms);
    }
}
