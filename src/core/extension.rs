//! The extension registry boundary.
//!
//! Discovery, manifest loading, and the extensions themselves live in the
//! host application. The scheduler only needs two capabilities: ask whether
//! an extension is currently loadable, and invoke it with the execution's
//! own request/context copies.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::error::ExtensionError;
use crate::core::execution::ExecutionRecord;

/// The inputs handed to an extension for one invocation.
///
/// These are copies owned by the call; extensions never see scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionCall {
    /// Opaque request payload.
    pub request: Value,
    /// Invocation context.
    pub context: HashMap<String, Value>,
    /// String parameters.
    pub params: HashMap<String, String>,
    /// Authentication material.
    pub auth: HashMap<String, String>,
    /// Boolean feature flags.
    pub flags: HashMap<String, bool>,
}

impl ExtensionCall {
    /// Copy the invocation inputs out of an execution record.
    #[must_use]
    pub fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            request: record.request.clone(),
            context: record.context.clone(),
            params: record.params.clone(),
            auth: record.auth.clone(),
            flags: record.flags.clone(),
        }
    }
}

/// Capability to resolve and invoke extensions, implemented by the host.
///
/// `invoke` receives a child of the execution's cancellation token; a
/// cooperating extension observes it at safe points and stops promptly.
/// The scheduler does not rely on that: when the parent token fires, the
/// invocation future is dropped and the scheduler-side outcome is written
/// regardless.
#[async_trait]
pub trait ExtensionRegistry: Send + Sync + Clone + 'static {
    /// Whether `extension_id` is currently loaded and enabled.
    fn is_loaded(&self, extension_id: &str) -> bool;

    /// Run the extension with the given call inputs.
    async fn invoke(
        &self,
        extension_id: &str,
        call: ExtensionCall,
        cancel: CancellationToken,
    ) -> Result<Value, ExtensionError>;
}
