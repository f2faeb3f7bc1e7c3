//! TR-181 node model and path utilities.
//!
//! A [`Node`] is the atomic unit every extractor, the validator, and the
//! comparison engine operate on. Nodes are immutable once built: an
//! extraction run produces a `Vec<Node>`, and nothing downstream mutates an
//! individual node in place. Hierarchy (`parent`/`children`) is derived from
//! `path` rather than stored as owning pointers — see [`attach_hierarchy`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix every well-formed TR-181 path begins with.
pub const ROOT_PREFIX: &str = "Device.";

/// Normalized TR-181 scalar types.
///
/// Raw source types (e.g. CWMP's `xsd:unsignedInt`) are normalized into this
/// set before a [`Node`] is constructed; see [`DataType::from_xsd`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Boolean,
    DateTime,
    Base64,
    HexBinary,
}

impl DataType {
    /// Normalize a raw source type string (CWMP `xsd:*` or a bare name) into
    /// a [`DataType`]. Returns `true` in the second position when the raw
    /// type was unrecognized and fell back to `String` (callers should emit
    /// a validation warning in that case).
    pub fn from_xsd(raw: &str) -> (Self, bool) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "xsd:string" | "string" => (Self::String, false),
            "xsd:int" | "xsd:int32" | "int" | "int32" => (Self::Int, false),
            "xsd:unsignedint" | "unsignedint" => (Self::UnsignedInt, false),
            "xsd:long" | "long" => (Self::Long, false),
            "xsd:unsignedlong" | "unsignedlong" => (Self::UnsignedLong, false),
            "xsd:boolean" | "boolean" => (Self::Boolean, false),
            "xsd:datetime" | "datetime" => (Self::DateTime, false),
            "xsd:base64binary" | "base64" | "base64binary" => (Self::Base64, false),
            "xsd:hexbinary" | "hexbinary" => (Self::HexBinary, false),
            _ => (Self::String, true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::UnsignedInt => "unsignedInt",
            Self::Long => "long",
            Self::UnsignedLong => "unsignedLong",
            Self::Boolean => "boolean",
            Self::DateTime => "dateTime",
            Self::Base64 => "base64",
            Self::HexBinary => "hexBinary",
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Int | Self::UnsignedInt | Self::Long | Self::UnsignedLong
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::UnsignedInt | Self::UnsignedLong)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameter access mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

impl Access {
    /// Normalize a raw source access string. Returns `None` when the raw
    /// value doesn't match any known spelling.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" | "ro" | "readonly" | "read-only" => Some(Self::ReadOnly),
            "readwrite" | "rw" | "read-write" => Some(Self::ReadWrite),
            "write" | "wo" | "writeonly" | "write-only" => Some(Self::WriteOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::WriteOnly => "write-only",
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraint bundle attached to a node's declared value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ValueRange {
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.allowed_values.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
    }
}

/// Declared event a node exposes, with the parameter paths it carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Declared function a node exposes, with input/output parameter paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub input_parameters: Vec<String>,
    #[serde(default)]
    pub output_parameters: Vec<String>,
}

/// A single TR-181 parameter or object.
///
/// Unknown fields encountered when deserializing a node from a requirement
/// document are preserved in `extra_fields` so a round trip through
/// [`crate::requirement::RequirementLoader`] doesn't silently drop data an
/// authoring tool wrote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub path: String,
    pub name: String,
    pub data_type: DataType,
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(default)]
    pub is_object: bool,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDescriptor>>,
    #[serde(flatten)]
    pub extra_fields: serde_json::Map<String, Value>,
}

impl Node {
    pub fn new(path: impl Into<String>, data_type: DataType, access: Access) -> Self {
        let path = path.into();
        let is_object = path_denotes_object(&path);
        let name = name_from_path(&path);
        Self {
            path,
            name,
            data_type,
            access,
            value: None,
            description: None,
            parent: None,
            children: None,
            is_object,
            is_custom: false,
            value_range: None,
            events: None,
            functions: None,
            extra_fields: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_value_range(mut self, range: ValueRange) -> Self {
        self.value_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<EventDescriptor>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_functions(mut self, functions: Vec<FunctionDescriptor>) -> Self {
        self.functions = Some(functions);
        self
    }

    #[must_use]
    pub fn as_custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    /// Mark `is_custom` based on whether `path` falls under any of the
    /// standard TR-181 prefixes known to the caller.
    pub fn mark_custom(&mut self, standard_prefixes: &[&str]) {
        self.is_custom = !standard_prefixes
            .iter()
            .any(|prefix| self.path.starts_with(prefix));
    }
}

/// True when `path` denotes an object container rather than a leaf
/// parameter — i.e. it ends in `.`.
pub fn path_denotes_object(path: &str) -> bool {
    path.ends_with('.')
}

/// Last segment of `path`, with any trailing `.` stripped.
pub fn name_from_path(path: &str) -> String {
    let trimmed = path.strip_suffix('.').unwrap_or(path);
    trimmed.rsplit('.').next().unwrap_or(trimmed).to_string()
}

/// Parent object path of `path`, or `None` for `Device.` itself.
///
/// `Device.WiFi.Radio.1.Channel` → `Some("Device.WiFi.Radio.1.")`.
/// `Device.WiFi.Radio.1.` (an object) → `Some("Device.WiFi.")`.
pub fn parent_path(path: &str) -> Option<String> {
    let trimmed = path.strip_suffix('.').unwrap_or(path);
    let idx = trimmed.rfind('.')?;
    Some(format!("{}.", &trimmed[..idx]))
}

/// Populate `parent` and `children` on every node in `nodes` from path
/// structure alone: no owning pointers are stored, only path strings
/// resolved against the per-run set passed in.
pub fn attach_hierarchy(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        node.parent = parent_path(&node.path);
    }
    let mut children_map: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for node in nodes.iter() {
        if let Some(parent) = &node.parent {
            children_map
                .entry(parent.clone())
                .or_default()
                .push(node.path.clone());
        }
    }
    for node in nodes.iter_mut() {
        if node.is_object {
            if let Some(children) = children_map.remove(&node.path) {
                node.children = Some(children);
            }
        }
    }
}
