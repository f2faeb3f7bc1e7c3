//! Generic device extractor: a thin adapter over a [`Hook`] for device REST
//! APIs that already expose a flat parameter listing (§4.4). Unlike
//! [`crate::cwmp::CwmpExtractor`] it does not recursively discover object
//! prefixes or batch retrieval — the hook's own transport is assumed to
//! already paginate and flatten whatever the device exposes under
//! `Device.`. Attribute/value retrieval failures still degrade via
//! [`PartialResult`] rather than aborting the run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::degradation::{PartialResult, apply_bounded_parallel};
use crate::errors::CoreError;
use crate::extractor::{Extractor, ExtractionOutcome, RawParameter, SourceInfo, build_node, join_attributes_and_values};
use crate::hook::{ConnectionGuard, DeviceConfig, Hook};
use crate::node::attach_hierarchy;
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::validator::default_standard_prefixes;

fn default_min_success_rate() -> f64 {
    0.5
}

fn default_max_in_flight() -> usize {
    5
}

/// Tunables for the generic extractor's retrieval step, analogous to
/// [`crate::cwmp::CwmpConfig`] but without discovery/batching knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenericExtractorConfig {
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GenericExtractorConfig {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            max_in_flight: default_max_in_flight(),
            retry: RetryConfig::default(),
        }
    }
}

/// Thin adapter over a [`Hook`] for device REST APIs that already return a
/// flat parameter listing for `Device.`.
pub struct GenericExtractor {
    hook: Arc<dyn Hook>,
    device_config: DeviceConfig,
    config: GenericExtractorConfig,
    standard_prefixes: Vec<String>,
}

impl GenericExtractor {
    pub fn new(hook: Arc<dyn Hook>, device_config: DeviceConfig, config: GenericExtractorConfig) -> Self {
        Self {
            hook,
            device_config,
            config,
            standard_prefixes: default_standard_prefixes(),
        }
    }

    #[must_use]
    pub fn with_standard_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.standard_prefixes = prefixes;
        self
    }

}

/// Free function (rather than a `&self` method) so it can be handed to
/// [`apply_bounded_parallel`] as an owned `'static` closure without
/// borrowing the extractor across the whole retrieval fan-out.
async fn retrieve_one(hook: Arc<dyn Hook>, retry: RetryConfig, path: String) -> Result<RawParameter, CoreError> {
    let path_for_attrs = vec![path.clone()];
    let path_for_values = vec![path.clone()];

    let attributes = retry_with_backoff(&retry, |attempt| {
        let hook = Arc::clone(&hook);
        let path = path_for_attrs.clone();
        async move {
            hook.get_parameter_attributes(&path)
                .await
                .map_err(|e| e.with_attempt(attempt))
        }
    })
    .await?;

    let values = retry_with_backoff(&retry, |attempt| {
        let hook = Arc::clone(&hook);
        let path = path_for_values.clone();
        async move {
            hook.get_parameter_values(&path)
                .await
                .map_err(|e| e.with_attempt(attempt))
        }
    })
    .await?;

    join_attributes_and_values(&[path.clone()], attributes, values)
        .pop()
        .ok_or_else(|| {
            CoreError::protocol(
                format!("device reported no attributes for '{path}'"),
                crate::errors::ErrorContext::new("retrieve_one", "generic_extractor"),
                true,
            )
        })
}

#[async_trait::async_trait]
impl Extractor for GenericExtractor {
    async fn extract(&self) -> Result<ExtractionOutcome, CoreError> {
        let guard = ConnectionGuard::acquire(Arc::clone(&self.hook), &self.device_config).await?;

        let result = async {
            let hook = Arc::clone(&self.hook);
            let paths = retry_with_backoff(&self.config.retry, |attempt| {
                let hook = Arc::clone(&hook);
                async move {
                    hook.get_parameter_names("Device.")
                        .await
                        .map_err(|e| e.with_attempt(attempt))
                }
            })
            .await?;
            let leaves: Vec<String> = paths.into_iter().filter(|p| !p.ends_with('.')).collect();
            let total = leaves.len();

            let retrieval: PartialResult<RawParameter, String> = apply_bounded_parallel(
                leaves,
                self.config.max_in_flight,
                {
                    let hook = Arc::clone(&self.hook);
                    let retry = self.config.retry.clone();
                    move |path: String| retrieve_one(Arc::clone(&hook), retry.clone(), path)
                },
            )
            .await;

            if !retrieval.failed.is_empty() && !retrieval.is_acceptable(self.config.min_success_rate) {
                return Err(CoreError::validation(
                    format!(
                        "generic extraction success rate {:.2} below minimum {:.2} ({} of {} failed)",
                        retrieval.success_rate(),
                        self.config.min_success_rate,
                        retrieval.failed.len(),
                        total,
                    ),
                    crate::errors::ErrorContext::new("extract", "generic_extractor"),
                ));
            }

            let mut nodes = Vec::with_capacity(retrieval.successful.len());
            for raw in retrieval.successful {
                let (node, warnings) = build_node(raw, &self.standard_prefixes);
                for warning in warnings {
                    tracing::warn!("{warning}");
                }
                nodes.push(node);
            }
            attach_hierarchy(&mut nodes);

            Ok(ExtractionOutcome {
                nodes,
                failed: retrieval.failed,
                total_discovered: total,
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
        SourceInfo::new("generic", self.device_config.endpoint.clone())
            .with_metadata(serde_json::json!({ "name": self.device_config.name }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{AuthenticationConfig, ParameterAttributes};
    use async_trait::async_trait;
    use rustc_hash::FxHashMap;
    use serde_json::Value;

    struct FlatHook {
        leaves: FxHashMap<String, (ParameterAttributes, Value)>,
    }

    #[async_trait]
    impl Hook for FlatHook {
        async fn connect(&self, _config: &DeviceConfig) -> Result<(), CoreError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn get_parameter_names(&self, _prefix: &str) -> Result<Vec<String>, CoreError> {
            Ok(self.leaves.keys().cloned().collect())
        }
        async fn get_parameter_values(
            &self,
            paths: &[String],
        ) -> Result<FxHashMap<String, Value>, CoreError> {
            Ok(paths
                .iter()
                .filter_map(|p| self.leaves.get(p).map(|(_, v)| (p.clone(), v.clone())))
                .collect())
        }
        async fn get_parameter_attributes(
            &self,
            paths: &[String],
        ) -> Result<FxHashMap<String, ParameterAttributes>, CoreError> {
            Ok(paths
                .iter()
                .filter_map(|p| self.leaves.get(p).map(|(a, _)| (p.clone(), a.clone())))
                .collect())
        }
        async fn set_parameter_values(
            &self,
            _values: &FxHashMap<String, Value>,
        ) -> Result<(), CoreError> {
            Ok(())
        }
        async fn subscribe_to_event(&self, _path: &str) -> Result<bool, CoreError> {
            Ok(true)
        }
        async fn call_function(
            &self,
            _path: &str,
            _inputs: &FxHashMap<String, Value>,
        ) -> Result<FxHashMap<String, Value>, CoreError> {
            Ok(FxHashMap::default())
        }
    }

    fn sample_config() -> DeviceConfig {
        DeviceConfig {
            name: "rest-device".to_string(),
            device_type: "generic".to_string(),
            endpoint: "https://device.example/api".to_string(),
            authentication: AuthenticationConfig::Bearer { token: "t".to_string() },
            timeout_secs: 30,
            retry_count: 3,
            hook_config: Value::Null,
        }
    }

    #[tokio::test]
    async fn extracts_flat_listing_without_recursion() {
        let mut leaves = FxHashMap::default();
        leaves.insert(
            "Device.DeviceInfo.SerialNumber".to_string(),
            (
                ParameterAttributes {
                    data_type: "xsd:string".to_string(),
                    access: "read".to_string(),
                    description: None,
                },
                Value::String("SN1".to_string()),
            ),
        );
        let hook = Arc::new(FlatHook { leaves });
        let mut config = GenericExtractorConfig::default();
        config.retry.base_delay_secs = 0.0;
        config.retry.jitter_secs = 0.0;
        let extractor = GenericExtractor::new(hook, sample_config(), config);

        let outcome = extractor.extract().await.unwrap();
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].path, "Device.DeviceInfo.SerialNumber");
    }
}
