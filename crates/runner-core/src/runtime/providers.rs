// crates/runner-core/src/runtime/providers.rs
// ============================================================================
// Module: Static Providers
// Description: Fixed provider discovery and a scripted single-region executor.
// Purpose: Drive cross-region execution deterministically.
// Dependencies: serde_json, tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! [`ScriptedSingleRegionExecutor`] replays per-provider call scripts. Each
//! call pops the next scripted step for the provider; once a script is empty
//! the call succeeds with a payload naming the provider, region, model, and
//! question.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::InferenceTask;
use crate::core::JobSpec;
use crate::core::ProviderId;
use crate::execution::region_matches;
use crate::interfaces::DiscoveryError;
use crate::interfaces::ProviderCallError;
use crate::interfaces::ProviderDiscovery;
use crate::interfaces::ProviderInfo;
use crate::interfaces::ProviderResponse;
use crate::interfaces::SingleRegionExecutor;

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// [`ProviderDiscovery`] over a fixed provider list.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderDiscovery {
    /// Known providers.
    providers: Vec<ProviderInfo>,
    /// Fail every lookup with this message.
    error: Option<String>,
}

impl StaticProviderDiscovery {
    /// Creates discovery over `providers`.
    #[must_use]
    pub const fn new(providers: Vec<ProviderInfo>) -> Self {
        Self {
            providers,
            error: None,
        }
    }

    /// Creates discovery that always fails.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            providers: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl ProviderDiscovery for StaticProviderDiscovery {
    async fn providers_in_region(&self, region: &str) -> Result<Vec<ProviderInfo>, DiscoveryError> {
        if let Some(message) = &self.error {
            return Err(DiscoveryError::Unavailable(message.clone()));
        }
        Ok(self
            .providers
            .iter()
            .filter(|provider| region_matches(&provider.region, region))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Scripted Executor
// ============================================================================

/// One scripted provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    /// Delay before the call resolves.
    pub delay: Duration,
    /// Call result.
    pub result: Result<ProviderResponse, ProviderCallError>,
}

impl ScriptedCall {
    /// Successful call returning `data` after `delay`.
    #[must_use]
    pub fn ok(delay: Duration, data: Value) -> Self {
        Self {
            delay,
            result: Ok(ProviderResponse {
                data,
                metadata: Map::new(),
            }),
        }
    }

    /// Failed call after `delay`.
    #[must_use]
    pub const fn err(delay: Duration, error: ProviderCallError) -> Self {
        Self {
            delay,
            result: Err(error),
        }
    }
}

/// Executor call observed by [`ScriptedSingleRegionExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCall {
    /// Provider called.
    pub provider_id: ProviderId,
    /// Region requested.
    pub region: String,
    /// Model requested.
    pub model: String,
    /// Prompt sent.
    pub prompt: Option<String>,
}

/// [`SingleRegionExecutor`] replaying scripted calls per provider.
#[derive(Debug, Default)]
pub struct ScriptedSingleRegionExecutor {
    /// Remaining steps by provider.
    scripts: Mutex<BTreeMap<ProviderId, VecDeque<ScriptedCall>>>,
    /// Calls made so far.
    calls: Mutex<Vec<ObservedCall>>,
}

impl ScriptedSingleRegionExecutor {
    /// Creates an executor where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends scripted steps for `provider`.
    #[must_use]
    pub fn with_script(self, provider: impl Into<String>, steps: Vec<ScriptedCall>) -> Self {
        if let Ok(mut guard) = self.scripts.lock() {
            guard.entry(ProviderId::new(provider)).or_default().extend(steps);
        }
        self
    }

    /// Returns the calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Pops the next step for `provider`.
    fn next_step(&self, provider: &ProviderId) -> Result<Option<ScriptedCall>, ProviderCallError> {
        let mut guard = self
            .scripts
            .lock()
            .map_err(|_| ProviderCallError::Permanent("executor mutex poisoned".to_string()))?;
        Ok(guard.get_mut(provider).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl SingleRegionExecutor for ScriptedSingleRegionExecutor {
    async fn execute(
        &self,
        spec: &JobSpec,
        task: &InferenceTask,
        provider: &ProviderInfo,
        region: &str,
    ) -> Result<ProviderResponse, ProviderCallError> {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(ObservedCall {
                provider_id: provider.id.clone(),
                region: region.to_string(),
                model: task.model.clone(),
                prompt: spec.prompt_for(task).map(ToString::to_string),
            });
        }
        let Some(step) = self.next_step(&provider.id)? else {
            let mut metadata = Map::new();
            metadata.insert("provider_used".to_string(), json!(provider.id.as_str()));
            return Ok(ProviderResponse {
                data: json!({
                    "job_id": spec.id.as_str(),
                    "provider": provider.id.as_str(),
                    "region": region,
                    "model": task.model,
                    "question": task.question,
                }),
                metadata,
            });
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.result
    }
}
