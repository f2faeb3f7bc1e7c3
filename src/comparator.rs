//! The comparison engine (§4.7): set-difference and attribute/value-diff
//! logic over two node lists, with TR-181-aware value normalization.
//!
//! [`crate::enhanced`] builds on top of this by adding validation and live
//! event/function probing; this module only ever looks at two already
//! extracted node lists, never a transport.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extractor::SourceInfo;
use crate::node::{Access, DataType, Node};
use crate::validator::coerce;

/// The kind of discrepancy a [`Difference`] records, per §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    OnlyInSource1,
    OnlyInSource2,
    TypeMismatch,
    AccessMismatch,
    ValueMismatch,
    RangeMismatch,
}

/// How serious a discrepancy is, independent of [`crate::errors::Severity`]
/// (which describes pipeline failures, not data-model disagreements).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceSeverity {
    Info,
    Warning,
    Error,
}

/// One discrepancy found by [`compare`] at a single path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Difference {
    pub path: String,
    pub kind: DifferenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source1_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source2_value: Option<Value>,
    pub severity: DifferenceSeverity,
    /// Free-form detail — which attribute disagreed, and (per the §4.7
    /// tie-break rule) which source's declared type was used to normalize
    /// a `value`/`range` comparison when `data_type` itself disagreed.
    #[serde(default)]
    pub metadata: Value,
}

impl Difference {
    fn new(path: impl Into<String>, kind: DifferenceKind, severity: DifferenceSeverity) -> Self {
        Self {
            path: path.into(),
            kind,
            source1_value: None,
            source2_value: None,
            severity,
            metadata: Value::Null,
        }
    }

    #[must_use]
    fn with_values(mut self, source1: Option<Value>, source2: Option<Value>) -> Self {
        self.source1_value = source1;
        self.source2_value = source2;
        self
    }

    #[must_use]
    fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Swap the two source values — used by [`compare`]'s symmetry test and
    /// by any caller that wants to re-express a difference from the other
    /// source's point of view.
    pub fn swapped(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: match self.kind {
                DifferenceKind::OnlyInSource1 => DifferenceKind::OnlyInSource2,
                DifferenceKind::OnlyInSource2 => DifferenceKind::OnlyInSource1,
                other => other,
            },
            source1_value: self.source2_value.clone(),
            source2_value: self.source1_value.clone(),
            severity: self.severity,
            metadata: self.metadata.clone(),
        }
    }
}

/// Totals per [`DifferenceKind`] plus per-source counts, per §4.7 "Summary".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub common_count: usize,
    pub only_in_source1_count: usize,
    pub only_in_source2_count: usize,
    pub counts_by_kind: FxHashMap<DifferenceKind, usize>,
}

impl ComparisonSummary {
    fn build(only_in_source1: usize, only_in_source2: usize, common: usize, differences: &[Difference]) -> Self {
        let mut counts_by_kind: FxHashMap<DifferenceKind, usize> = FxHashMap::default();
        for diff in differences {
            *counts_by_kind.entry(diff.kind).or_insert(0) += 1;
        }
        Self {
            common_count: common,
            only_in_source1_count: only_in_source1,
            only_in_source2_count: only_in_source2,
            counts_by_kind,
        }
    }
}

/// Output of [`compare`]: the internal report object §6 says renderers
/// (JSON/XML/text, out of scope here) consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub source1: SourceInfo,
    pub source2: SourceInfo,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub only_in_source1: Vec<Node>,
    pub only_in_source2: Vec<Node>,
    pub differences: Vec<Difference>,
    pub summary: ComparisonSummary,
}

/// Hash-indexable key distinguishing object paths (trailing `.`) from leaf
/// paths at the same stem — per §4.7 step 1, comparing an object to a leaf
/// sharing a stem is itself a `type_mismatch`, so the index is keyed on the
/// literal path string (trailing dot included) rather than a stem.
fn index_by_path(nodes: &[Node]) -> FxHashMap<&str, &Node> {
    nodes.iter().map(|n| (n.path.as_str(), n)).collect()
}

/// Compare two already-extracted node lists and produce a [`ComparisonReport`].
/// `started_at`/`duration_ms` are supplied by the caller (composition
/// boundary) rather than read from the system clock here, keeping this
/// function deterministic and independent of wall-clock time for testing
/// (§8 property 5).
pub fn compare(
    source1: SourceInfo,
    source2: SourceInfo,
    nodes1: &[Node],
    nodes2: &[Node],
    started_at: DateTime<Utc>,
    duration_ms: u64,
) -> ComparisonReport {
    let index1 = index_by_path(nodes1);
    let index2 = index_by_path(nodes2);

    let mut only_in_source1: Vec<Node> = Vec::new();
    let mut only_in_source2: Vec<Node> = Vec::new();
    let mut differences: Vec<Difference> = Vec::new();

    for node in nodes1 {
        if !index2.contains_key(node.path.as_str()) {
            only_in_source1.push(node.clone());
        }
    }
    for node in nodes2 {
        if !index1.contains_key(node.path.as_str()) {
            only_in_source2.push(node.clone());
        }
    }

    let common_count = nodes1
        .iter()
        .filter(|n| index2.contains_key(n.path.as_str()))
        .count();

    for node1 in nodes1 {
        let Some(node2) = index2.get(node1.path.as_str()) else {
            continue;
        };
        differences.extend(compare_pair(node1, node2));
    }

    differences.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp_key().cmp(&b.kind.cmp_key())));

    only_in_source1.sort_by(|a, b| a.path.cmp(&b.path));
    only_in_source2.sort_by(|a, b| a.path.cmp(&b.path));

    let summary = ComparisonSummary::build(
        only_in_source1.len(),
        only_in_source2.len(),
        common_count,
        &differences,
    );

    ComparisonReport {
        source1,
        source2,
        started_at,
        duration_ms,
        only_in_source1,
        only_in_source2,
        differences,
        summary,
    }
}

impl DifferenceKind {
    /// Stable ordinal used only to break path ties in sort order (§4.7 step
    /// 4 — "sort all differences by path"; a secondary key keeps the sort
    /// total and therefore deterministic when a path has more than one
    /// difference).
    fn cmp_key(&self) -> u8 {
        match self {
            Self::OnlyInSource1 => 0,
            Self::OnlyInSource2 => 1,
            Self::TypeMismatch => 2,
            Self::AccessMismatch => 3,
            Self::ValueMismatch => 4,
            Self::RangeMismatch => 5,
        }
    }
}

/// Compare one path present in both sources, emitting zero or more
/// differences. An object-vs-leaf mismatch at the same path short-circuits
/// the rest of the comparison (comparing `access`/`value`/`range` across an
/// object and a leaf isn't meaningful).
fn compare_pair(node1: &Node, node2: &Node) -> Vec<Difference> {
    let path = &node1.path;

    if node1.is_object != node2.is_object {
        return vec![
            Difference::new(path.clone(), DifferenceKind::TypeMismatch, DifferenceSeverity::Error)
                .with_metadata(serde_json::json!({
                    "attribute": "is_object",
                    "source1": node1.is_object,
                    "source2": node2.is_object,
                })),
        ];
    }

    let mut differences = Vec::new();

    if node1.data_type != node2.data_type {
        differences.push(
            Difference::new(path.clone(), DifferenceKind::TypeMismatch, DifferenceSeverity::Error)
                .with_values(
                    Some(Value::String(node1.data_type.to_string())),
                    Some(Value::String(node2.data_type.to_string())),
                )
                .with_metadata(serde_json::json!({
                    "attribute": "data_type",
                    "coercion_type_used": "source1",
                })),
        );
    }

    if node1.access != node2.access {
        differences.push(
            Difference::new(path.clone(), DifferenceKind::AccessMismatch, DifferenceSeverity::Warning)
                .with_values(
                    Some(Value::String(node1.access.to_string())),
                    Some(Value::String(node2.access.to_string())),
                ),
        );
    }

    // Tie-break per §4.7: when types disagree, use source1's declared type
    // to normalize both values before comparing.
    let comparison_type = node1.data_type;

    if let (Some(v1), Some(v2)) = (&node1.value, &node2.value) {
        let normalized1 = coerce(comparison_type, v1).unwrap_or_else(|_| v1.clone());
        let normalized2 = coerce(comparison_type, v2).unwrap_or_else(|_| v2.clone());
        if normalized1 != normalized2 {
            let mut metadata = serde_json::json!({ "attribute": "value" });
            if node1.data_type != node2.data_type {
                metadata["coercion_type_used"] = Value::String(comparison_type.to_string());
            }
            differences.push(
                Difference::new(path.clone(), DifferenceKind::ValueMismatch, DifferenceSeverity::Error)
                    .with_values(Some(v1.clone()), Some(v2.clone()))
                    .with_metadata(metadata),
            );
        }
    }

    if node1.value_range != node2.value_range {
        differences.push(
            Difference::new(path.clone(), DifferenceKind::RangeMismatch, DifferenceSeverity::Warning)
                .with_metadata(serde_json::json!({
                    "source1": node1.value_range,
                    "source2": node2.value_range,
                })),
        );
    }

    differences
}
