//! Transport abstraction: the `Hook` trait every extractor drives, plus the
//! process-wide registry that maps a configured device `type` string to a
//! concrete hook implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CoreError, ErrorContext};

/// Credentials for a device endpoint. The `Custom` variant exists for
/// transports this crate doesn't know about in advance (a hook
/// implementation can interpret `fields` however it needs to).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    Basic {
        username: String,
        password: String,
    },
    Digest {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
    },
    OAuth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
    Custom {
        #[serde(flatten)]
        fields: serde_json::Map<String, Value>,
    },
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

/// Everything a hook needs to connect to one device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub endpoint: String,
    pub authentication: AuthenticationConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Free-form transport-specific settings (CWMP ACS callback URL,
    /// generic-device API version, ...), interpreted by the hook
    /// implementation the registry resolves for `device_type`.
    #[serde(default)]
    pub hook_config: Value,
}

impl DeviceConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Attributes reported for a single parameter by `get_parameter_attributes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterAttributes {
    pub data_type: String,
    pub access: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Transport abstraction every extractor drives. Implementations adapt a
/// concrete protocol (CWMP/TR-069, a device REST API, a test double) to
/// this uniform surface; nothing above this trait knows which protocol it's
/// talking to.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn connect(&self, config: &DeviceConfig) -> Result<(), CoreError>;
    async fn disconnect(&self) -> Result<(), CoreError>;

    /// List immediate and transitive parameter/object names under `prefix`
    /// (an object path ending in `.`). Object children are returned with
    /// their own trailing `.`; leaves without one.
    async fn get_parameter_names(&self, prefix: &str) -> Result<Vec<String>, CoreError>;

    async fn get_parameter_values(
        &self,
        paths: &[String],
    ) -> Result<FxHashMap<String, Value>, CoreError>;

    async fn get_parameter_attributes(
        &self,
        paths: &[String],
    ) -> Result<FxHashMap<String, ParameterAttributes>, CoreError>;

    async fn set_parameter_values(
        &self,
        values: &FxHashMap<String, Value>,
    ) -> Result<(), CoreError>;

    /// Attempt to subscribe to an event path. Returns `Ok(true)` if the
    /// device acknowledged the subscription, `Ok(false)` if it explicitly
    /// declined (not an error — the enhanced comparison engine records this
    /// as a failed conformance probe rather than propagating an error).
    async fn subscribe_to_event(&self, path: &str) -> Result<bool, CoreError>;

    async fn call_function(
        &self,
        path: &str,
        inputs: &FxHashMap<String, Value>,
    ) -> Result<FxHashMap<String, Value>, CoreError>;
}

type HookFactory = Arc<dyn Fn(&DeviceConfig) -> Result<Box<dyn Hook>, CoreError> + Send + Sync>;

/// Process-wide `device_type` → hook-constructor registry. Extractors never
/// construct a hook directly; they resolve one through
/// [`HookRegistry::global`] so the concrete transport stays swappable by
/// configuration alone.
pub struct HookRegistry {
    factories: Mutex<HashMap<String, HookFactory>>,
}

impl HookRegistry {
    fn new() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static HookRegistry {
        static REGISTRY: OnceLock<HookRegistry> = OnceLock::new();
        REGISTRY.get_or_init(HookRegistry::new)
    }

    pub fn register<F>(&self, device_type: impl Into<String>, factory: F)
    where
        F: Fn(&DeviceConfig) -> Result<Box<dyn Hook>, CoreError> + Send + Sync + 'static,
    {
        let mut factories = self.factories.lock().expect("hook registry lock poisoned");
        factories.insert(device_type.into(), Arc::new(factory));
    }

    pub fn is_registered(&self, device_type: &str) -> bool {
        let factories = self.factories.lock().expect("hook registry lock poisoned");
        factories.contains_key(device_type)
    }

    pub fn create(&self, config: &DeviceConfig) -> Result<Box<dyn Hook>, CoreError> {
        let factories = self.factories.lock().expect("hook registry lock poisoned");
        let factory = factories.get(config.device_type.as_str()).ok_or_else(|| {
            CoreError::configuration(
                format!("no hook registered for device type '{}'", config.device_type),
                ErrorContext::new("hook_registry.create", "hook"),
            )
        })?;
        factory(config)
    }
}

/// Guarantees a hook's `disconnect` runs once `connect` has succeeded, on
/// every exit path — including when the caller's future is dropped before
/// completing (task cancellation, a `select!` losing a race). Rust has no
/// language-level context manager; the common idiom this mirrors is a
/// `Drop` guard that does best-effort async cleanup by spawning onto the
/// ambient runtime if the guard is dropped without an explicit `release`.
pub struct ConnectionGuard {
    hook: Arc<dyn Hook>,
    released: std::sync::atomic::AtomicBool,
}

impl ConnectionGuard {
    pub async fn acquire(hook: Arc<dyn Hook>, config: &DeviceConfig) -> Result<Self, CoreError> {
        hook.connect(config).await?;
        Ok(Self {
            hook,
            released: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn hook(&self) -> &dyn Hook {
        self.hook.as_ref()
    }

    /// Disconnect explicitly. Safe to call more than once; only the first
    /// call actually disconnects.
    pub async fn release(&self) -> Result<(), CoreError> {
        if self
            .released
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return Ok(());
        }
        self.hook.disconnect().await
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.released.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let hook = Arc::clone(&self.hook);
            handle.spawn(async move {
                if let Err(err) = hook.disconnect().await {
                    tracing::warn!(error = %err, "best-effort disconnect on dropped connection guard failed");
                }
            });
        } else {
            tracing::warn!("connection guard dropped outside a tokio runtime; disconnect was not attempted");
        }
    }
}
