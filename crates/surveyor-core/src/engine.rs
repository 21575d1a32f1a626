//! Plan execution with instance caching, bounded concurrency and
//! failure capture.
//!
//! The engine owns the only mutable shared state in the core: a module
//! instance cache keyed by module id, created lazily on first use and
//! reused across steps and plans. Independent steps run in parallel under
//! a semaphore; a step linked by `depends_on` waits for its predecessors'
//! *completion* (success or failure) and then decides for itself whether
//! to run. Nothing that goes wrong during execution escapes as an error —
//! every failure becomes data on a [`StepResult`], and the result list
//! always has exactly one entry per planned step, in plan order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::capability::{AnalysisModule, ExecutionContext, ModuleFactory, ModuleOutput};
use crate::planner::{ExecutionPlan, ExecutionStep};
use crate::registry::Registry;

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The module could not be instantiated; every step referencing the
    /// module in the same execution fails with this, without retry.
    InstantiationFailure,
    /// The module ran out of its time budget.
    InvocationTimeout,
    /// The module returned an error (or its task misbehaved).
    InvocationError,
    /// A dependency step did not succeed; this step was never invoked.
    DependencySkipped,
    /// The plan was cancelled before or while this step ran.
    Cancelled,
}

/// A step failure, captured as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

/// Outcome of one executed (or skipped) step. Produced exactly once per
/// step, immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: u64,
    pub module_id: String,
    pub source_id: String,
    pub success: bool,
    /// Opaque module payload; `Value::Null` on failure.
    pub payload: Value,
    pub insights: Vec<String>,
    /// Invocation time; zero for steps that never ran.
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    pub error: Option<StepError>,
}

impl StepResult {
    fn succeeded(step: &ExecutionStep, started_at: DateTime<Utc>, elapsed: Duration, output: ModuleOutput) -> Self {
        Self {
            step_id: step.step_id,
            module_id: step.module_id.clone(),
            source_id: step.source_id.clone(),
            success: true,
            payload: output.payload,
            insights: output.insights,
            elapsed,
            started_at,
            error: None,
        }
    }

    fn failed(
        step: &ExecutionStep,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        kind: StepErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step.step_id,
            module_id: step.module_id.clone(),
            source_id: step.source_id.clone(),
            success: false,
            payload: Value::Null,
            insights: Vec::new(),
            elapsed,
            started_at,
            error: Some(StepError {
                kind,
                message: message.into(),
            }),
        }
    }
}

/// Tuning knobs for a plan execution.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of steps in flight at once.
    pub max_concurrent: usize,
    /// Per-step invocation budget.
    pub step_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            step_timeout: Duration::from_secs(30),
        }
    }
}

/// Cooperative plan-level cancellation signal.
///
/// Cancelling marks in-flight steps for abandonment and records every
/// unfinished step as failed with [`StepErrorKind::Cancelled`]. The
/// instance cache is untouched, so the engine stays reusable.
#[derive(Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes [`ExecutionPlan`]s against registered modules and sources.
pub struct ExecutionEngine {
    registry: Arc<Registry>,
    factory: Arc<dyn ModuleFactory>,
    config: EngineConfig,
    instances: Arc<Mutex<HashMap<String, Arc<dyn AnalysisModule>>>>,
}

impl ExecutionEngine {
    /// Engine with default tuning.
    pub fn new(registry: Arc<Registry>, factory: Arc<dyn ModuleFactory>) -> Self {
        Self::with_config(registry, factory, EngineConfig::default())
    }

    pub fn with_config(
        registry: Arc<Registry>,
        factory: Arc<dyn ModuleFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            config,
            instances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Execute `plan` to completion. Never fails: per-step problems come
    /// back as failed [`StepResult`]s in plan order.
    pub async fn execute(&self, plan: &ExecutionPlan) -> Vec<StepResult> {
        self.execute_with_cancel(plan, &CancellationHandle::new())
            .await
    }

    /// Execute `plan`, abandoning work when `cancel` fires.
    #[instrument(skip(self, plan, cancel), fields(plan_id = %plan.plan_id, steps = plan.len()))]
    pub async fn execute_with_cancel(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancellationHandle,
    ) -> Vec<StepResult> {
        let total = plan.steps.len();
        if total == 0 {
            return Vec::new();
        }

        // One completion channel per step: None = pending, Some(success)
        // once the step has a result. Dependents wait on these.
        let mut completions: HashMap<u64, watch::Receiver<Option<bool>>> =
            HashMap::with_capacity(total);
        let mut senders: Vec<watch::Sender<Option<bool>>> = Vec::with_capacity(total);
        for step in &plan.steps {
            let (tx, rx) = watch::channel(None);
            completions.insert(step.step_id, rx);
            senders.push(tx);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        // Module ids whose instantiation already failed in this execution;
        // later steps fail fast instead of retrying.
        let failed_instantiations: Arc<Mutex<HashSet<String>>> =
            Arc::new(Mutex::new(HashSet::new()));

        let mut join_set: JoinSet<(usize, StepResult)> = JoinSet::new();
        for ((index, step), done) in plan.steps.iter().enumerate().zip(senders) {
            let step = step.clone();
            let dependencies: Vec<(u64, watch::Receiver<Option<bool>>)> = step
                .depends_on
                .iter()
                .filter_map(|id| completions.get(id).map(|rx| (*id, rx.clone())))
                .collect();
            let worker = StepWorker {
                registry: Arc::clone(&self.registry),
                factory: Arc::clone(&self.factory),
                instances: Arc::clone(&self.instances),
                failed_instantiations: Arc::clone(&failed_instantiations),
                semaphore: Arc::clone(&semaphore),
                timeout: self.config.step_timeout,
            };
            let cancel_rx = cancel.subscribe();

            join_set.spawn(async move {
                let result = worker.run(&step, dependencies, cancel_rx).await;
                // Always publish completion, whatever happened, so that
                // dependents never hang.
                let _ = done.send(Some(result.success));
                (index, result)
            });
        }

        let mut slots: Vec<Option<StepResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_error) => {
                    warn!(error = %join_error, "step task did not complete");
                }
            }
        }

        // Results return in plan order regardless of completion order. A
        // vanished task (panic) still yields a recorded failure.
        plan.steps
            .iter()
            .zip(slots)
            .map(|(step, slot)| {
                slot.unwrap_or_else(|| {
                    StepResult::failed(
                        step,
                        Utc::now(),
                        Duration::ZERO,
                        StepErrorKind::InvocationError,
                        "step task terminated without producing a result",
                    )
                })
            })
            .collect()
    }

    /// Drop all cached module instances. The next plan re-instantiates
    /// on first use.
    pub async fn clear_instances(&self) {
        self.instances.lock().await.clear();
        debug!("cleared module instance cache");
    }

    /// Number of currently cached module instances.
    pub async fn cached_instance_count(&self) -> usize {
        self.instances.lock().await.len()
    }
}

/// Everything one step task needs, bundled to keep the spawn call legible.
struct StepWorker {
    registry: Arc<Registry>,
    factory: Arc<dyn ModuleFactory>,
    instances: Arc<Mutex<HashMap<String, Arc<dyn AnalysisModule>>>>,
    failed_instantiations: Arc<Mutex<HashSet<String>>>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl StepWorker {
    async fn run(
        &self,
        step: &ExecutionStep,
        dependencies: Vec<(u64, watch::Receiver<Option<bool>>)>,
        mut cancel: watch::Receiver<bool>,
    ) -> StepResult {
        let started_at = Utc::now();

        // Wait for every dependency to complete, success or not.
        let mut dependency_failed = false;
        for (dependency_id, mut rx) in dependencies {
            let completed: Option<bool> = tokio::select! {
                outcome = rx.wait_for(|v| v.is_some()) => match outcome {
                    Ok(value) => *value,
                    // Sender dropped without publishing: the dependency
                    // task died, treat it as failed.
                    Err(_) => Some(false),
                },
                _ = cancel.wait_for(|c| *c) => {
                    return StepResult::failed(
                        step,
                        started_at,
                        Duration::ZERO,
                        StepErrorKind::Cancelled,
                        format!("cancelled while waiting for step {dependency_id}"),
                    );
                }
            };
            if completed != Some(true) {
                dependency_failed = true;
            }
        }
        if dependency_failed {
            debug!(step_id = step.step_id, "skipping step: dependency did not succeed");
            return StepResult::failed(
                step,
                started_at,
                Duration::ZERO,
                StepErrorKind::DependencySkipped,
                "a dependency step did not succeed",
            );
        }

        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return StepResult::failed(
                        step,
                        started_at,
                        Duration::ZERO,
                        StepErrorKind::InvocationError,
                        "executor semaphore closed",
                    );
                }
            },
            _ = cancel.wait_for(|c| *c) => {
                return StepResult::failed(
                    step,
                    started_at,
                    Duration::ZERO,
                    StepErrorKind::Cancelled,
                    "cancelled before start",
                );
            }
        };

        let instance = match self.resolve_instance(&step.module_id).await {
            Ok(instance) => instance,
            Err(message) => {
                warn!(step_id = step.step_id, module_id = %step.module_id, %message, "instantiation failed");
                return StepResult::failed(
                    step,
                    started_at,
                    Duration::ZERO,
                    StepErrorKind::InstantiationFailure,
                    message,
                );
            }
        };

        let source = match self.registry.source(&step.source_id) {
            Some(source) => source.clone(),
            None => {
                return StepResult::failed(
                    step,
                    started_at,
                    Duration::ZERO,
                    StepErrorKind::InvocationError,
                    format!("data source '{}' is not registered", step.source_id),
                );
            }
        };
        let context = ExecutionContext { source };

        let invocation_start = Instant::now();
        tokio::select! {
            outcome = tokio::time::timeout(self.timeout, instance.execute(&step.parameters, &context)) => {
                let elapsed = invocation_start.elapsed();
                match outcome {
                    Ok(Ok(output)) => {
                        debug!(step_id = step.step_id, module_id = %step.module_id, ?elapsed, "step succeeded");
                        StepResult::succeeded(step, started_at, elapsed, output)
                    }
                    Ok(Err(error)) => {
                        warn!(step_id = step.step_id, module_id = %step.module_id, error = %error, "step failed");
                        StepResult::failed(
                            step,
                            started_at,
                            elapsed,
                            StepErrorKind::InvocationError,
                            error.to_string(),
                        )
                    }
                    Err(_) => {
                        warn!(step_id = step.step_id, module_id = %step.module_id, "step timed out");
                        StepResult::failed(
                            step,
                            started_at,
                            elapsed,
                            StepErrorKind::InvocationTimeout,
                            format!("step exceeded its {}ms budget", self.timeout.as_millis()),
                        )
                    }
                }
            }
            _ = cancel.wait_for(|c| *c) => {
                // The in-flight invocation is abandoned; whatever it
                // eventually produces is discarded with the future.
                StepResult::failed(
                    step,
                    started_at,
                    invocation_start.elapsed(),
                    StepErrorKind::Cancelled,
                    "cancelled mid-invocation",
                )
            }
        }
    }

    /// Fetch the cached instance for `module_id` or create it.
    ///
    /// Both lookup and creation happen under the cache lock, so two steps
    /// racing on first use of the same module can never both instantiate
    /// it — and a failed instantiation is never retried within the same
    /// execution either.
    async fn resolve_instance(&self, module_id: &str) -> Result<Arc<dyn AnalysisModule>, String> {
        let mut cache = self.instances.lock().await;
        if let Some(instance) = cache.get(module_id) {
            return Ok(Arc::clone(instance));
        }

        let mut failed = self.failed_instantiations.lock().await;
        if failed.contains(module_id) {
            return Err(format!(
                "module '{module_id}' already failed to instantiate in this execution"
            ));
        }

        let Some(descriptor) = self.registry.module(module_id) else {
            failed.insert(module_id.to_string());
            return Err(format!("module '{module_id}' is not registered"));
        };

        match self.factory.instantiate(descriptor) {
            Ok(instance) => {
                debug!(%module_id, "instantiated module");
                cache.insert(module_id.to_string(), Arc::clone(&instance));
                Ok(instance)
            }
            Err(error) => {
                failed.insert(module_id.to_string());
                Err(error.to_string())
            }
        }
    }
}
