//! The CWMP/TR-069 extractor: recursive parameter-name discovery over a
//! [`Hook`], followed by batched attribute/value retrieval with per-path
//! fallback on batch failure.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::degradation::{PartialResult, apply_bounded_parallel};
use crate::errors::{CoreError, ErrorContext};
use crate::extractor::{
    Extractor, ExtractionOutcome, RawParameter, SourceInfo, build_node, join_attributes_and_values,
};
use crate::hook::{ConnectionGuard, DeviceConfig, Hook};
use crate::node::attach_hierarchy;
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::validator::default_standard_prefixes;

fn default_depth_cap() -> u32 {
    32
}

fn default_batch_size() -> usize {
    50
}

fn default_min_success_rate() -> f64 {
    0.5
}

fn default_max_in_flight() -> usize {
    5
}

/// Tunables for the discovery/retrieval protocol, distinct from the
/// [`RetryConfig`] applied to each individual hook call. Deserializable so it
/// can live inside a [`DeviceConfig::hook_config`] document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CwmpConfig {
    #[serde(default = "default_depth_cap")]
    pub depth_cap: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for CwmpConfig {
    fn default() -> Self {
        Self {
            depth_cap: default_depth_cap(),
            batch_size: default_batch_size(),
            min_success_rate: default_min_success_rate(),
            max_in_flight: default_max_in_flight(),
            retry: RetryConfig::default(),
        }
    }
}

/// Recursive-discovery extractor driving a CWMP/TR-069 [`Hook`].
pub struct CwmpExtractor {
    hook: Arc<dyn Hook>,
    device_config: DeviceConfig,
    cwmp_config: CwmpConfig,
    standard_prefixes: Vec<String>,
}

impl CwmpExtractor {
    pub fn new(hook: Arc<dyn Hook>, device_config: DeviceConfig, cwmp_config: CwmpConfig) -> Self {
        Self {
            hook,
            device_config,
            cwmp_config,
            standard_prefixes: default_standard_prefixes(),
        }
    }

    #[must_use]
    pub fn with_standard_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.standard_prefixes = prefixes;
        self
    }

    /// Breadth-first name discovery starting at `Device.`. Returns the
    /// discovered leaf paths; object prefixes are followed but not returned.
    async fn discover(&self, correlation_id: &str) -> Result<Vec<String>, CoreError> {
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        queue.push_back(("Device.".to_string(), 0));
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut leaves = Vec::new();

        while let Some((prefix, depth)) = queue.pop_front() {
            if !visited.insert(prefix.clone()) {
                tracing::warn!(correlation_id, prefix = %prefix, "discovery cycle detected, skipping");
                continue;
            }
            if depth > self.cwmp_config.depth_cap {
                tracing::warn!(
                    correlation_id,
                    prefix = %prefix,
                    depth,
                    "depth cap exceeded, pruning subtree"
                );
                continue;
            }

            let hook = Arc::clone(&self.hook);
            let prefix_for_call = prefix.clone();
            let names = retry_with_backoff(&self.cwmp_config.retry, |attempt| {
                let hook = Arc::clone(&hook);
                let prefix = prefix_for_call.clone();
                async move {
                    hook.get_parameter_names(&prefix)
                        .await
                        .map_err(|err| err.with_attempt(attempt))
                }
            })
            .await?;

            for name in names {
                if name.ends_with('.') {
                    queue.push_back((name, depth + 1));
                } else {
                    leaves.push(name);
                }
            }
        }

        Ok(leaves)
    }

    /// Retrieve attributes and values for `leaves` in fixed-size batches,
    /// falling back to per-path retrieval when an entire batch call fails.
    async fn retrieve(
        &self,
        leaves: Vec<String>,
        correlation_id: &str,
    ) -> PartialResult<RawParameter, String> {
        let total = leaves.len();
        let mut successful = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for batch in leaves.chunks(self.cwmp_config.batch_size.max(1)) {
            let batch: Vec<String> = batch.to_vec();
            match self.retrieve_batch(&batch).await {
                Ok(raws) => successful.extend(raws),
                Err(batch_err) => {
                    tracing::warn!(
                        correlation_id,
                        error = %batch_err,
                        batch_len = batch.len(),
                        "batch retrieval failed, falling back to per-path retrieval"
                    );
                    let per_path = apply_bounded_parallel(
                        batch,
                        self.cwmp_config.max_in_flight,
                        {
                            let hook = Arc::clone(&self.hook);
                            let retry = self.cwmp_config.retry.clone();
                            move |path: String| {
                                let hook = Arc::clone(&hook);
                                let retry = retry.clone();
                                async move { retrieve_one(hook.as_ref(), &retry, path).await }
                            }
                        },
                    )
                    .await;
                    successful.extend(per_path.successful);
                    failed.extend(per_path.failed);
                }
            }
            tokio::task::yield_now().await;
        }

        PartialResult {
            successful,
            failed,
            total,
        }
    }

    async fn retrieve_batch(&self, batch: &[String]) -> Result<Vec<RawParameter>, CoreError> {
        let (attributes, values) = tokio::try_join!(
            retry_with_backoff(&self.cwmp_config.retry, |attempt| {
                let hook = Arc::clone(&self.hook);
                let batch = batch.to_vec();
                async move { hook.get_parameter_attributes(&batch).await.map_err(|e| e.with_attempt(attempt)) }
            }),
            retry_with_backoff(&self.cwmp_config.retry, |attempt| {
                let hook = Arc::clone(&self.hook);
                let batch = batch.to_vec();
                async move { hook.get_parameter_values(&batch).await.map_err(|e| e.with_attempt(attempt)) }
            }),
        )?;
        Ok(join_attributes_and_values(batch, attributes, values))
    }
}

async fn retrieve_one(
    hook: &dyn Hook,
    retry: &RetryConfig,
    path: String,
) -> Result<RawParameter, CoreError> {
    let path_for_attrs = vec![path.clone()];
    let path_for_values = vec![path.clone()];
    let attributes = retry_with_backoff(retry, |attempt| {
        let path = path_for_attrs.clone();
        async move {
            hook.get_parameter_attributes(&path)
                .await
                .map_err(|e| e.with_attempt(attempt))
        }
    })
    .await?;
    let values = retry_with_backoff(retry, |attempt| {
        let path = path_for_values.clone();
        async move {
            hook.get_parameter_values(&path)
                .await
                .map_err(|e| e.with_attempt(attempt))
        }
    })
    .await?;

    let mut joined = join_attributes_and_values(&[path.clone()], attributes, values);
    joined
        .pop()
        .ok_or_else(|| {
            CoreError::protocol(
                format!("device reported no attributes for '{path}'"),
                ErrorContext::new("retrieve_one", "cwmp_extractor"),
                true,
            )
        })
}

#[async_trait::async_trait]
impl Extractor for CwmpExtractor {
    async fn extract(&self) -> Result<ExtractionOutcome, CoreError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let guard = ConnectionGuard::acquire(Arc::clone(&self.hook), &self.device_config).await?;

        let result = async {
            let leaves = self.discover(&correlation_id).await?;
            let retrieval = self.retrieve(leaves, &correlation_id).await;

            if !retrieval.failed.is_empty() && !retrieval.is_acceptable(self.cwmp_config.min_success_rate) {
                return Err(CoreError::validation(
                    format!(
                        "CWMP extraction success rate {:.2} below minimum {:.2} ({} of {} failed)",
                        retrieval.success_rate(),
                        self.cwmp_config.min_success_rate,
                        retrieval.failed.len(),
                        retrieval.total,
                    ),
                    ErrorContext::new("extract", "cwmp_extractor")
                        .with_correlation_id(correlation_id.clone())
                        .with_metadata(serde_json::json!({
                            "failed_paths": retrieval.failed.iter().map(|(p, _)| p).collect::<Vec<_>>(),
                        })),
                ));
            }

            let mut warnings = Vec::new();
            let mut nodes = Vec::with_capacity(retrieval.successful.len());
            for raw in retrieval.successful {
                let (node, node_warnings) = build_node(raw, &self.standard_prefixes);
                nodes.push(node);
                warnings.extend(node_warnings);
            }
            attach_hierarchy(&mut nodes);

            for warning in &warnings {
                tracing::warn!(correlation_id = %correlation_id, "{warning}");
            }

            Ok(ExtractionOutcome {
                nodes,
                failed: retrieval.failed,
                total_discovered: retrieval.total,
            })
        }
        .await;

        guard.release().await?;
        result
    }

    async fn validate(&self) -> bool {
        self.hook.connect(&self.device_config).await.is_ok()
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo::new("cwmp", self.device_config.endpoint.clone())
            .with_metadata(serde_json::json!({ "name": self.device_config.name }))
    }
}
