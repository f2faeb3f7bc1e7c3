//! Programmatic assembly of [`DeviceConfig`]/[`RetryConfig`] records.
//! Loading those records from a file or environment is a front-end
//! collaborator's responsibility, not this crate's; this builder only
//! composes already-constructed pieces into the record shapes the rest of
//! the pipeline consumes.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::{CoreError, ErrorContext};
use crate::hook::DeviceConfig;
use crate::retry::RetryConfig;

/// Assembles a [`DeviceConfig`] alongside its [`RetryConfig`] from
/// already-constructed pieces — no file or environment access.
#[derive(Debug, Default)]
pub struct DeviceConfigBuilder {
    device: Option<DeviceConfig>,
    retry: RetryConfig,
}

impl DeviceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-constructed [`DeviceConfig`] — e.g. one a
    /// caller's own discovery or loading mechanism produced.
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = Some(device);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(mut self) -> Result<DeviceConfig, CoreError> {
        let context = || ErrorContext::new("config.build", "device_config_builder");
        let device = self
            .device
            .take()
            .ok_or_else(|| CoreError::configuration("no device configuration was supplied: call with_device first", context()))?;

        Ok(device)
    }

    /// Retry configuration assembled alongside the device config. Call
    /// after `build` to get the paired retry settings.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Initialize the crate's `tracing` subscriber from `RUST_LOG` (defaulting
/// to `info` when unset): a small one-shot helper a binary calls once at
/// startup, not something library code invokes on its own. Installs
/// `tracing-error`'s `ErrorLayer` alongside the `fmt` layer so a `miette`
/// `Diagnostic` built from a [`CoreError`] can carry a captured span trace.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .with(ErrorLayer::default())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::AuthenticationConfig;

    fn sample_device() -> DeviceConfig {
        DeviceConfig {
            name: "test-device".to_string(),
            device_type: "generic".to_string(),
            endpoint: "https://device.example/api".to_string(),
            authentication: AuthenticationConfig::Bearer { token: "initial".to_string() },
            timeout_secs: 30,
            retry_count: 3,
            hook_config: serde_json::Value::Null,
        }
    }

    #[test]
    fn build_assembles_device_and_retry_from_explicit_calls() {
        let device = DeviceConfigBuilder::new()
            .with_device(sample_device())
            .with_retry(RetryConfig { max_attempts: 5, ..RetryConfig::default() })
            .build()
            .unwrap();
        assert_eq!(device.endpoint, "https://device.example/api");
    }

    #[test]
    fn retry_accessor_reflects_the_builder_call() {
        let builder =
            DeviceConfigBuilder::new().with_device(sample_device()).with_retry(RetryConfig { max_attempts: 7, ..RetryConfig::default() });
        assert_eq!(builder.retry().max_attempts, 7);
    }

    #[test]
    fn build_without_a_base_config_fails() {
        let err = DeviceConfigBuilder::new().build().unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Configuration);
    }
}
