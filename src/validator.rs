//! Path syntax, value coercion, and range/namespace validation for TR-181
//! nodes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{Access, DataType, Node, ValueRange};

/// Path without instance-index template placeholders, e.g. a node pulled
/// straight from a live device.
static STRICT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Device(\.(?:[A-Z][A-Za-z0-9]*|[0-9]+))+\.?$").expect("valid regex")
});

/// Path allowing `{placeholder}` segments in place of a concrete instance
/// index, for requirement documents that describe a table generically
/// rather than against a specific device's current instances.
static TEMPLATE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Device(\.(?:[A-Z][A-Za-z0-9]*|[0-9]+|\{[A-Za-z0-9_]+\}))+\.?$")
        .expect("valid regex")
});

/// Where a node came from, used to decide how strict validation should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceOrigin {
    /// A live CWMP device. CWMP devices are known to report slightly
    /// off-spec attributes in the wild (vendor extensions, stale type
    /// strings); validation runs in lenient mode and downgrades what would
    /// otherwise be errors to warnings.
    Cwmp,
    /// A generic device API, a requirement document, or any other source
    /// that's expected to already conform.
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub path: String,
    pub message: String,
    pub severity: FindingSeverity,
}

/// Outcome of validating a single node (or a batch of them, via
/// [`ValidationResult::merge`]).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    fn push(&mut self, path: &str, message: impl Into<String>, severity: FindingSeverity) {
        let finding = ValidationFinding {
            path: path.to_string(),
            message: message.into(),
            severity,
        };
        match severity {
            FindingSeverity::Error => self.errors.push(finding),
            FindingSeverity::Warning => self.warnings.push(finding),
        }
    }
}

/// Validates node paths, values, and namespaces against TR-181 syntax rules.
///
/// `standard_prefixes` lists the object prefixes considered part of the
/// standard data model (`Device.WiFi.`, `Device.DeviceInfo.`, ...); any path
/// outside all of them is treated as a vendor/custom extension, which is
/// allowed but flagged as such rather than rejected.
#[derive(Clone, Debug)]
pub struct Validator {
    standard_prefixes: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(default_standard_prefixes())
    }
}

impl Validator {
    pub fn new(standard_prefixes: Vec<String>) -> Self {
        Self { standard_prefixes }
    }

    pub fn standard_prefixes(&self) -> &[String] {
        &self.standard_prefixes
    }

    /// Validate a node's path, declared type/value, and namespace. `origin`
    /// controls whether CWMP leniency applies.
    pub fn validate_node(&self, node: &Node, origin: SourceOrigin) -> ValidationResult {
        let mut result = ValidationResult::default();
        let severity_for_strict = |is_lenient: bool| {
            if is_lenient {
                FindingSeverity::Warning
            } else {
                FindingSeverity::Error
            }
        };
        let lenient = matches!(origin, SourceOrigin::Cwmp);

        if let Err(message) = validate_path(&node.path, node.is_object, true) {
            result.push(&node.path, message, severity_for_strict(lenient));
        }

        if let Some(value) = &node.value {
            if let Err(message) = coerce(node.data_type, value) {
                result.push(
                    &node.path,
                    format!("value does not match declared type {}: {message}", node.data_type),
                    severity_for_strict(lenient),
                );
            } else if let Some(range) = &node.value_range {
                if let Err(message) = validate_range(node.data_type, value, range) {
                    result.push(&node.path, message, severity_for_strict(lenient));
                }
            }
        }

        if !self.standard_prefixes.is_empty() {
            let is_custom = !self
                .standard_prefixes
                .iter()
                .any(|prefix| node.path.starts_with(prefix.as_str()));
            if is_custom && !node.is_custom {
                result.push(
                    &node.path,
                    "path falls outside standard namespace prefixes but is not marked custom",
                    FindingSeverity::Warning,
                );
            }
        }

        result
    }
}

/// Validate path syntax. `is_object` asserts the expected trailing-dot
/// convention matches; `allow_templates` permits `{placeholder}` instance
/// segments (used for requirement documents).
pub fn validate_path(path: &str, is_object: bool, allow_templates: bool) -> Result<(), String> {
    let re = if allow_templates {
        &*TEMPLATE_PATH_RE
    } else {
        &*STRICT_PATH_RE
    };
    if !re.is_match(path) {
        return Err(format!("'{path}' is not a syntactically valid TR-181 path"));
    }
    let ends_with_dot = path.ends_with('.');
    if ends_with_dot != is_object {
        return Err(format!(
            "'{path}' trailing-dot convention does not match is_object={is_object}"
        ));
    }
    Ok(())
}

/// Coerce a raw JSON value into the shape implied by `data_type`, applying
/// the per-type syntactic rules (numeric parsing, ISO-8601 for `dateTime`,
/// base64/hex alphabet checks). Returns the coerced value on success so
/// callers (the comparison engine) can normalize before comparing.
pub fn coerce(data_type: DataType, value: &Value) -> Result<Value, String> {
    match data_type {
        DataType::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Ok(Value::String(other.to_string())),
        },
        DataType::Int | DataType::Long => {
            let n = as_i64(value).ok_or_else(|| format!("'{value}' is not a valid integer"))?;
            Ok(Value::from(n))
        }
        DataType::UnsignedInt | DataType::UnsignedLong => {
            let n = as_u64(value).ok_or_else(|| format!("'{value}' is not a valid unsigned integer"))?;
            Ok(Value::from(n))
        }
        DataType::Boolean => {
            let b = match value {
                Value::Bool(b) => Some(*b),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Some(true),
                    "false" | "0" | "no" | "off" => Some(false),
                    _ => None,
                },
                Value::Number(n) => n.as_i64().map(|n| n != 0),
                _ => None,
            }
            .ok_or_else(|| format!("'{value}' is not a valid boolean"))?;
            Ok(Value::Bool(b))
        }
        DataType::DateTime => {
            let s = value
                .as_str()
                .ok_or_else(|| "dateTime value must be a string".to_string())?;
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| Value::String(s.to_string()))
                .map_err(|e| format!("'{s}' is not a valid ISO-8601 dateTime: {e}"))
        }
        DataType::Base64 => {
            let s = value
                .as_str()
                .ok_or_else(|| "base64 value must be a string".to_string())?;
            if is_valid_base64(s) {
                Ok(Value::String(s.to_string()))
            } else {
                Err(format!("'{s}' is not valid base64"))
            }
        }
        DataType::HexBinary => {
            let s = value
                .as_str()
                .ok_or_else(|| "hexBinary value must be a string".to_string())?;
            if !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit()) {
                Ok(Value::String(s.to_ascii_lowercase()))
            } else {
                Err(format!("'{s}' is not valid hexBinary"))
            }
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_valid_base64(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    let trimmed = s.trim_end_matches('=');
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/')
        && s.len() % 4 == 0
}

/// Validate a coerced value against a [`ValueRange`]: numeric min/max,
/// allowed-values membership, string max length, and pattern match.
pub fn validate_range(data_type: DataType, value: &Value, range: &ValueRange) -> Result<(), String> {
    if let Some(allowed) = &range.allowed_values {
        if !allowed.iter().any(|candidate| candidate == value) {
            return Err(format!("'{value}' is not one of the allowed values"));
        }
    }

    if data_type.is_integral() {
        if let Some(n) = value.as_f64() {
            if let Some(min) = range.min {
                if n < min {
                    return Err(format!("{n} is below minimum {min}"));
                }
            }
            if let Some(max) = range.max {
                if n > max {
                    return Err(format!("{n} is above maximum {max}"));
                }
            }
        }
    }

    if data_type == DataType::String {
        if let Some(s) = value.as_str() {
            if let Some(max_length) = range.max_length {
                if s.len() > max_length {
                    return Err(format!(
                        "string of length {} exceeds max_length {max_length}",
                        s.len()
                    ));
                }
            }
            if let Some(pattern) = &range.pattern {
                let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
                if !re.is_match(s) {
                    return Err(format!("'{s}' does not match pattern '{pattern}'"));
                }
            }
        }
    }

    Ok(())
}

/// A reasonable starting set of standard TR-181 top-level object prefixes.
/// Callers extracting against a specific data-model profile are expected to
/// supply their own list via [`Validator::new`]; this default exists so
/// `Validator::default()` is usable out of the box.
pub fn default_standard_prefixes() -> Vec<String> {
    [
        "Device.DeviceInfo.",
        "Device.ManagementServer.",
        "Device.Time.",
        "Device.IP.",
        "Device.WiFi.",
        "Device.Ethernet.",
        "Device.PPP.",
        "Device.DHCPv4.",
        "Device.DHCPv6.",
        "Device.Firewall.",
        "Device.NAT.",
        "Device.Hosts.",
        "Device.UserInterface.",
        "Device.Services.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Also exported for reuse: normalize an access-mode string, falling back
/// to the access already recorded on the node when the source's spelling is
/// unrecognized (paired with a caller-supplied warning).
pub fn normalize_access_or(raw: &str, fallback: Access) -> (Access, bool) {
    match Access::normalize(raw) {
        Some(access) => (access, false),
        None => (fallback, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_path_rejects_templates() {
        assert!(validate_path("Device.WiFi.Radio.1.Channel", false, false).is_ok());
        assert!(validate_path("Device.WiFi.Radio.{i}.Channel", false, false).is_err());
        assert!(validate_path("Device.WiFi.Radio.{i}.Channel", false, true).is_ok());
    }

    #[test]
    fn trailing_dot_must_match_is_object() {
        assert!(validate_path("Device.WiFi.", true, false).is_ok());
        assert!(validate_path("Device.WiFi.", false, false).is_err());
        assert!(validate_path("Device.WiFi.Radio.1.Channel", true, false).is_err());
    }

    #[test]
    fn coerce_boolean_accepts_yes_no_on_off_case_insensitively() {
        for (literal, expected) in [("YES", true), ("on", true), ("No", false), ("OFF", false)] {
            assert_eq!(coerce(DataType::Boolean, &Value::String(literal.into())).unwrap(), Value::Bool(expected));
        }
    }

    #[test]
    fn coerce_rejects_out_of_range_and_malformed_values() {
        assert!(coerce(DataType::UnsignedInt, &Value::from(-1)).is_err());
        assert!(coerce(DataType::Boolean, &Value::String("maybe".into())).is_err());
        assert!(coerce(DataType::DateTime, &Value::String("not-a-date".into())).is_err());
        assert!(coerce(DataType::HexBinary, &Value::String("abc".into())).is_err());
        assert!(coerce(DataType::HexBinary, &Value::String("deadbeef".into())).is_ok());
    }

    #[test]
    fn validate_range_checks_bounds_and_allowed_values() {
        let range = ValueRange {
            min: Some(0.0),
            max: Some(10.0),
            ..Default::default()
        };
        assert!(validate_range(DataType::Int, &Value::from(5), &range).is_ok());
        assert!(validate_range(DataType::Int, &Value::from(11), &range).is_err());

        let allowed = ValueRange {
            allowed_values: Some(vec![Value::from("up"), Value::from("down")]),
            ..Default::default()
        };
        assert!(validate_range(DataType::String, &Value::from("up"), &allowed).is_ok());
        assert!(validate_range(DataType::String, &Value::from("sideways"), &allowed).is_err());
    }

    #[test]
    fn cwmp_origin_downgrades_to_warnings() {
        let validator = Validator::new(vec!["Device.WiFi.".to_string()]);
        // lowercase segment: fails path syntax regardless of template mode.
        let node = Node::new(
            "Device.wifi.radio.1.channel",
            DataType::UnsignedInt,
            Access::ReadWrite,
        );
        let result = validator.validate_node(&node, SourceOrigin::Cwmp);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);

        let strict_result = validator.validate_node(&node, SourceOrigin::Strict);
        assert_eq!(strict_result.errors.len(), 1);
        assert!(strict_result.warnings.is_empty());
    }
}
