//! Execution scheduler.
//!
//! Drives one task through the phases of a workflow: gates, the phase
//! runner, retries, cancellation and completion. Each run is one tokio task.
//! The in-memory [`Task`] is the single writer of its execution state and
//! is persisted after every transition.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::dag::PhaseGraph;
use crate::core::execution::{PhaseStatus, ValidationDecision};
use crate::core::task::{ExecutorClaim, Task, TaskId, TaskStatus};
use crate::events::{Event, EventKind, EventSink, SessionSource, SessionTracker};
use crate::gate::{ApproveAll, AutoGatePolicy, GateBroker, GateOutcome};
use crate::orchestration::orphan::{
    release_orphan, OrphanDetector, OrphanStatus, ProcessProbe, ProcfsProbe,
};
use crate::orchestration::planner::plan_start;
use crate::orchestration::reconcile::reconcile;
use crate::orchestration::registry::{RunGuard, RunningTasks};
use crate::orchestration::retry::{
    build_retry_prompt, write_retry_context_file, RetryPolicy, RetryTracker,
};
use crate::orchestration::runner::{resolve_prompt, PhaseInput, PhaseOutput, PhaseRunner};
use crate::store::Store;
use crate::util::{blocking, blocking_with_timeout, lock};
use crate::workflow::{validate_phases, GateType, PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use crate::{Error, Result};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Recorded as the session model when neither phase nor workflow names one.
const DEFAULT_MODEL: &str = "default";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    /// How long a human gate may wait. `None` waits until cancelled.
    pub gate_timeout: Option<Duration>,
    /// Finish in `finalizing` instead of `completed`.
    pub finalize_on_complete: bool,
    pub store_timeout: Duration,
    /// Base directory for relative file prompts.
    pub prompt_dir: Option<PathBuf>,
    /// Where full retry context files are written, one directory per task.
    pub retry_context_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            gate_timeout: None,
            finalize_on_complete: false,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            prompt_dir: None,
            retry_context_dir: None,
        }
    }
}

/// A spawned run.
#[derive(Debug)]
pub struct RunHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    join: JoinHandle<Result<TaskStatus>>,
}

impl RunHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to exit and return the task's final status.
    pub async fn wait(self) -> Result<TaskStatus> {
        self.join
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?
    }
}

/// Everything loaded during pre-flight.
struct RunPlan {
    task: Task,
    workflow: Workflow,
    graph: PhaseGraph,
    templates: HashMap<String, PhaseTemplate>,
}

/// How the phase loop ended for one phase.
enum Step {
    Continue,
    Exit(TaskStatus),
}

#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn Store>,
    runner: Arc<dyn PhaseRunner>,
    events: Arc<dyn EventSink>,
    broker: Arc<GateBroker>,
    policy: Arc<dyn AutoGatePolicy>,
    registry: RunningTasks,
    session: Option<Arc<SessionTracker>>,
    config: ExecutorConfig,
    /// Last copy of each running task handed to the store.
    snapshots: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl Executor {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn PhaseRunner>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            runner,
            events,
            broker: Arc::new(GateBroker::new()),
            policy: Arc::new(ApproveAll),
            registry: RunningTasks::new(),
            session: None,
            config: ExecutorConfig::default(),
            snapshots: Arc::default(),
        }
    }

    pub fn with_broker(mut self, broker: Arc<GateBroker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AutoGatePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_registry(mut self, registry: RunningTasks) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_session(mut self, session: Arc<SessionTracker>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn broker(&self) -> &Arc<GateBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &RunningTasks {
        &self.registry
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.registry.is_running(task_id)
    }

    /// Fire the cancellation token of a running task.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        self.registry.cancel(task_id)
    }

    /// Register the run now and drive it on a spawned tokio task.
    ///
    /// Fails with `AlreadyRunning` before anything is spawned.
    pub fn start(
        &self,
        task_id: &TaskId,
        workflow_id: &WorkflowId,
        cancel: CancellationToken,
    ) -> Result<RunHandle> {
        let guard = self.registry.try_register(task_id, cancel.clone())?;
        let this = self.clone();
        let workflow_id = workflow_id.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { this.run_registered(guard, &workflow_id, token).await });
        Ok(RunHandle {
            task_id: task_id.clone(),
            cancel,
            join,
        })
    }

    /// Drive a task to completion, failure, a gate block or a pause.
    pub async fn run(
        &self,
        task_id: &TaskId,
        workflow_id: &WorkflowId,
        cancel: CancellationToken,
    ) -> Result<TaskStatus> {
        let guard = self.registry.try_register(task_id, cancel.clone())?;
        self.run_registered(guard, workflow_id, cancel).await
    }

    /// Take over a task whose executor died while it was running, then run it
    /// from the interrupted phase.
    ///
    /// Fails with `NotOrphaned` unless `detector` confirms the claim is dead.
    pub async fn resume_orphan<P: ProcessProbe>(
        &self,
        task_id: &TaskId,
        workflow_id: &WorkflowId,
        detector: &OrphanDetector<P>,
        cancel: CancellationToken,
    ) -> Result<TaskStatus> {
        let guard = self.registry.try_register(task_id, cancel.clone())?;
        let store = self.store.clone();
        let id = task_id.clone();
        let mut task = blocking_with_timeout(self.config.store_timeout, move || {
            store.load_task(&id)?.ok_or(Error::TaskNotFound(id))
        })
        .await?;

        let reason = match detector.check(&task) {
            OrphanStatus::Orphaned(reason) => reason,
            other => {
                return Err(Error::NotOrphaned {
                    task: task_id.clone(),
                    detail: other.to_string(),
                })
            }
        };
        warn!(task = %task_id, phase = ?task.current_phase, %reason, "recovering orphaned task");
        release_orphan(&mut task)?;
        let store = self.store.clone();
        let released = task.clone();
        blocking_with_timeout(self.config.store_timeout, move || store.save_task(&released))
            .await?;
        self.task_updated(&task);

        self.run_registered(guard, workflow_id, cancel).await
    }

    async fn run_registered(
        &self,
        guard: RunGuard,
        workflow_id: &WorkflowId,
        cancel: CancellationToken,
    ) -> Result<TaskStatus> {
        let task_id = guard.task_id().clone();
        if let Some(session) = &self.session {
            session.run_started();
        }

        let outcome = AssertUnwindSafe(self.drive(&task_id, workflow_id, &cancel))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %task_id, "run panicked: {}", message);
                Err(Error::InconsistentState {
                    task: task_id.clone(),
                    detail: format!("run panicked: {}", message),
                })
            }
        };
        if let Err(e) = &result {
            warn!(task = %task_id, "run exited with error: {}", e);
        }

        // Pre-flight failures never save, so they leave the task untouched.
        let snapshot = lock(&self.snapshots).remove(&task_id);
        if let Some(snapshot) = snapshot {
            let store = self.store.clone();
            let events = self.events.clone();
            let id = task_id.clone();
            if let Err(e) = blocking_with_timeout(self.config.store_timeout, move || {
                Ok(reconcile(store.as_ref(), events.as_ref(), &id, Some(snapshot)))
            })
            .await
            {
                error!(task = %task_id, "reconciliation failed: {}", e);
            }
        }

        let released = self.broker.release_task(&task_id);
        if released > 0 {
            debug!(task = %task_id, released, "released gate entries");
        }
        if let Some(session) = &self.session {
            session.run_finished();
            self.events
                .publish(Event::global(EventKind::SessionUpdate(session.summary())));
        }
        drop(guard);
        result
    }

    async fn drive(
        &self,
        task_id: &TaskId,
        workflow_id: &WorkflowId,
        cancel: &CancellationToken,
    ) -> Result<TaskStatus> {
        let RunPlan {
            mut task,
            workflow,
            graph,
            templates,
        } = self.preflight(task_id, workflow_id).await?;

        if !task.status.is_runnable() {
            return Err(Error::TaskNotRunnable {
                task: task_id.clone(),
                status: task.status,
            });
        }
        let start = plan_start(&task, &graph, &self.config.retry.effective_map())?;

        let mut to_reset = graph.downstream(&start);
        for phase in graph.topological_order() {
            if task.execution.phase_status(phase.id()) != PhaseStatus::Completed {
                to_reset.insert(phase.id().to_string());
            }
        }
        for phase in &to_reset {
            task.execution.reset_phase(phase);
        }
        task.set_status(TaskStatus::Running)?;
        task.current_phase = Some(start.clone());
        task.execution.error = None;
        task.workflow_id = Some(workflow_id.clone());
        task.executor = Some(ExecutorClaim::current(ProcfsProbe.own_start_time()));
        self.save(&task).await?;
        info!(task = %task_id, workflow = %workflow_id, phase = %start, "run started");
        self.task_updated(&task);

        let mut tracker = RetryTracker::new();
        let mut cross_retries = 0u32;
        let mut prior_outputs: BTreeMap<String, String> = BTreeMap::new();

        loop {
            let Some(phase) = graph.ready_phases(&task.execution).first().map(|p| (*p).clone()) else {
                break;
            };
            let template = templates
                .get(phase.id())
                .ok_or_else(|| Error::PhaseTemplateNotFound(phase.id().to_string()))?;

            if cancel.is_cancelled() {
                return self.pause(&mut task, phase.id()).await;
            }

            match self
                .pass_gate(&mut task, &phase, template, &prior_outputs, cancel)
                .await?
            {
                Step::Continue => {}
                Step::Exit(status) => return Ok(status),
            }
            if task.execution.phase_status(phase.id()) == PhaseStatus::Skipped {
                continue;
            }

            let id = phase.id().to_string();
            task.execution.start_phase(&id);
            task.current_phase = Some(id.clone());
            if let Some(claim) = task.executor.as_mut() {
                claim.heartbeat();
            }
            self.save(&task).await?;
            let iteration = task.execution.phase(&id).map_or(1, |p| p.iterations);
            info!(task = %task_id, phase = %id, iteration, "phase started");
            self.emit(
                task_id,
                EventKind::PhaseStarted {
                    phase: id.clone(),
                    iteration,
                },
            );

            let (model, outcome) = match self
                .build_input(&task, &workflow, &phase, template, iteration, &prior_outputs)
                .await
            {
                Ok(input) => {
                    let model = input.model.clone();
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.runner.run(input, cancel.clone()) => Some(result),
                    };
                    (model, outcome)
                }
                Err(e) => (None, Some(Err(e))),
            };

            match outcome {
                None => return self.pause(&mut task, &id).await,
                Some(Ok(output)) => {
                    let model = model.as_deref();
                    self.complete_phase(&mut task, &id, model, output, &mut prior_outputs)
                        .await?;
                }
                Some(Err(e)) => {
                    let step = self
                        .handle_failure(
                            &mut task,
                            &graph,
                            &phase,
                            template,
                            e,
                            &mut tracker,
                            &mut cross_retries,
                        )
                        .await?;
                    if let Step::Exit(status) = step {
                        return Ok(status);
                    }
                }
            }
        }

        if !graph.all_done(&task.execution) {
            return Err(Error::InconsistentState {
                task: task_id.clone(),
                detail: "no phase is ready but the workflow is not done".to_string(),
            });
        }

        let status = if self.config.finalize_on_complete {
            TaskStatus::Finalizing
        } else {
            TaskStatus::Completed
        };
        task.set_status(status)?;
        task.execution.clear_retry_context();
        task.executor = None;
        self.save(&task).await?;
        info!(task = %task_id, status = %status, "run complete");
        self.task_updated(&task);
        self.emit(task_id, EventKind::Complete { status });
        Ok(status)
    }

    async fn preflight(&self, task_id: &TaskId, workflow_id: &WorkflowId) -> Result<RunPlan> {
        let store = self.store.clone();
        let task_id = task_id.clone();
        let workflow_id = workflow_id.clone();
        blocking_with_timeout(self.config.store_timeout, move || {
            let workflow = store
                .load_workflow(&workflow_id)?
                .ok_or_else(|| Error::WorkflowNotFound(workflow_id.clone()))?;
            let phases = store.get_workflow_phases(&workflow_id)?;
            validate_phases(&phases).into_result(&workflow_id)?;
            let graph = PhaseGraph::new(&workflow_id, &phases)?;

            let mut templates = HashMap::new();
            for phase in &phases {
                let template = store
                    .get_phase_template(phase.id())?
                    .ok_or_else(|| Error::PhaseTemplateNotFound(phase.id().to_string()))?;
                templates.insert(phase.id().to_string(), template);
            }

            let task = store
                .load_task(&task_id)?
                .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
            Ok(RunPlan {
                task,
                workflow,
                graph,
                templates,
            })
        })
        .await
    }

    async fn pass_gate(
        &self,
        task: &mut Task,
        phase: &WorkflowPhase,
        template: &PhaseTemplate,
        prior_outputs: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        let id = phase.id();
        let gate = phase.effective_gate(template);
        let outcome = match gate {
            GateType::Skip => {
                task.execution.skip_phase(id, "gate skip");
                task.execution
                    .record_gate_decision(id, gate, true, Some("skipped".to_string()));
                task.current_phase = Some(id.to_string());
                self.save(task).await?;
                debug!(task = %task.id, phase = %id, "phase skipped by gate");
                self.emit(
                    &task.id,
                    EventKind::PhaseSkipped {
                        phase: id.to_string(),
                        reason: "gate skip".to_string(),
                    },
                );
                return Ok(Step::Continue);
            }
            GateType::Auto => {
                let output = phase
                    .depends_on
                    .iter()
                    .rev()
                    .find_map(|dep| prior_outputs.get(dep))
                    .map(String::as_str);
                self.policy.evaluate(task, id, output)
            }
            GateType::Human => {
                let ticket = self.broker.request_decision(&task.id, id);
                task.current_phase = Some(id.to_string());
                self.save(task).await?;
                self.emit(
                    &task.id,
                    EventKind::GateRequested {
                        phase: id.to_string(),
                        decision: ticket.id,
                    },
                );
                match ticket.wait(cancel, self.config.gate_timeout).await {
                    Ok(outcome) => outcome,
                    Err(Error::GateTimeoutOrCancelled { .. }) => {
                        info!(task = %task.id, phase = %id, "gate wait ended without decision");
                        return self.pause(task, id).await.map(Step::Exit);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        task.execution
            .record_gate_decision(id, gate, outcome.approved, outcome.reason.clone());
        self.emit(
            &task.id,
            EventKind::GateDecided {
                phase: id.to_string(),
                approved: outcome.approved,
                reason: outcome.reason.clone(),
            },
        );
        if outcome.approved {
            return Ok(Step::Continue);
        }
        self.block(task, id, &outcome).await.map(Step::Exit)
    }

    async fn build_input(
        &self,
        task: &Task,
        workflow: &Workflow,
        phase: &WorkflowPhase,
        template: &PhaseTemplate,
        iteration: u32,
        prior_outputs: &BTreeMap<String, String>,
    ) -> Result<PhaseInput> {
        let retry_context = task
            .execution
            .retry_context
            .as_ref()
            .filter(|ctx| ctx.to_phase == phase.id())
            .map(build_retry_prompt);

        let prompt = {
            let template = template.clone();
            let task = task.clone();
            let prior = prior_outputs.clone();
            let retry = retry_context.clone();
            let base = self.config.prompt_dir.clone();
            blocking(move || {
                resolve_prompt(&template, &task, &prior, retry.as_deref(), base.as_deref())
            })
            .await?
        };

        Ok(PhaseInput {
            task_id: task.id.clone(),
            workflow_id: workflow.id.clone(),
            phase: phase.id().to_string(),
            template: template.clone(),
            model: phase.effective_model(workflow),
            thinking: phase.effective_thinking(template, workflow),
            iteration,
            prompt,
            prior_outputs: prior_outputs.clone(),
            retry_context,
        })
    }

    async fn complete_phase(
        &self,
        task: &mut Task,
        id: &str,
        model: Option<&str>,
        output: PhaseOutput,
        prior_outputs: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let exec = &mut task.execution;
        exec.complete_phase(id, output.commit.clone());
        exec.add_tokens(id, &output.tokens);
        exec.add_cost(id, output.cost_usd);
        for artifact in &output.artifacts {
            exec.add_artifact(id, artifact);
        }
        if let Some(session_id) = &output.session_id {
            exec.ensure_phase(id).session_id = Some(session_id.clone());
            let turns = exec
                .session
                .as_ref()
                .filter(|s| &s.id == session_id)
                .map_or(0, |s| s.turn_count);
            exec.set_session(session_id, model.unwrap_or(DEFAULT_MODEL), "active", turns + 1);
        }
        if exec
            .retry_context
            .as_ref()
            .is_some_and(|ctx| ctx.from_phase == id)
        {
            exec.clear_retry_context();
        }
        prior_outputs.insert(id.to_string(), output.content);
        self.save(task).await?;

        info!(task = %task.id, phase = %id, tokens = output.tokens.total, "phase completed");
        self.emit(
            &task.id,
            EventKind::PhaseCompleted {
                phase: id.to_string(),
                commit: output.commit,
            },
        );
        if let Some(session) = &self.session {
            session.add_usage(&output.tokens, output.cost_usd);
            self.events
                .publish(Event::global(EventKind::SessionUpdate(session.summary())));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(
        &self,
        task: &mut Task,
        graph: &PhaseGraph,
        phase: &WorkflowPhase,
        template: &PhaseTemplate,
        err: Error,
        tracker: &mut RetryTracker,
        cross_retries: &mut u32,
    ) -> Result<Step> {
        let id = phase.id();
        let message = match err {
            Error::PhaseRunner { message, .. } => message,
            other => other.to_string(),
        };
        task.execution.fail_phase(id, &message);
        let failures = tracker.record_failure(id);
        let max_iterations = phase.effective_max_iterations(template);
        let target = self.retry_target(task, graph, phase, template);
        let cross_phase = target != id;
        let will_retry = tracker.can_retry(id, max_iterations)
            && (!cross_phase || *cross_retries < self.config.retry.max_retries);

        warn!(
            task = %task.id,
            phase = %id,
            failures,
            max_iterations,
            will_retry,
            "phase failed: {}",
            message
        );
        self.save(task).await?;
        self.emit(
            &task.id,
            EventKind::PhaseFailed {
                phase: id.to_string(),
                error: message.clone(),
                will_retry,
            },
        );

        if !will_retry {
            let summary = format!(
                "phase {} failed after {} attempt(s): {}",
                id, failures, message
            );
            task.execution.error = Some(summary.clone());
            task.set_status(TaskStatus::Failed)?;
            task.executor = None;
            self.save(task).await?;
            error!(task = %task.id, phase = %id, "{}", summary);
            self.emit(
                &task.id,
                EventKind::Error {
                    phase: Some(id.to_string()),
                    message: summary,
                },
            );
            self.task_updated(task);
            return Ok(Step::Exit(TaskStatus::Failed));
        }

        let exec = &mut task.execution;
        exec.set_retry_context(id, &target, &message, Some(message.clone()), failures);
        exec.record_validation(id, ValidationDecision::Retry, &message);
        let record = self
            .config
            .retry_context_dir
            .clone()
            .zip(exec.retry_context.clone());
        if let Some((dir, ctx)) = record {
            let task_id = task.id.clone();
            match blocking(move || write_retry_context_file(&dir, &task_id, &ctx)).await {
                Ok(path) => task
                    .execution
                    .set_retry_context_file(&path.display().to_string()),
                Err(e) => {
                    warn!(task = %task.id, phase = %id, "could not write retry context file: {}", e)
                }
            }
        }
        let exec = &mut task.execution;
        if cross_phase {
            *cross_retries += 1;
        }
        exec.reset_phase(id);
        for downstream in graph.downstream(&target) {
            exec.reset_phase(&downstream);
        }
        task.current_phase = Some(target.clone());
        self.save(task).await?;
        info!(task = %task.id, from = %id, to = %target, attempt = failures, "retrying");
        Ok(Step::Continue)
    }

    /// Phase to re-enter after `phase` failed. Cross-phase targets must be in
    /// the workflow and already completed; otherwise the phase retries itself.
    fn retry_target(
        &self,
        task: &Task,
        graph: &PhaseGraph,
        phase: &WorkflowPhase,
        template: &PhaseTemplate,
    ) -> String {
        let id = phase.id();
        if !self.config.retry.enabled {
            return id.to_string();
        }
        template
            .retry_from_phase
            .clone()
            .or_else(|| self.config.retry.should_retry_from(id).map(str::to_string))
            .or_else(|| phase.loop_config.as_ref().map(|l| l.loop_to_phase.clone()))
            .filter(|target| {
                target != id
                    && graph.contains(target)
                    && task.execution.phase_status(target) == PhaseStatus::Completed
            })
            .unwrap_or_else(|| id.to_string())
    }

    async fn pause(&self, task: &mut Task, phase: &str) -> Result<TaskStatus> {
        task.execution.interrupt_phase(phase);
        task.current_phase = Some(phase.to_string());
        task.set_status(TaskStatus::Paused)?;
        task.executor = None;
        self.save(task).await?;
        info!(task = %task.id, phase = %phase, "run interrupted, task paused");
        self.task_updated(task);
        Ok(TaskStatus::Paused)
    }

    async fn block(&self, task: &mut Task, phase: &str, outcome: &GateOutcome) -> Result<TaskStatus> {
        let reason = outcome
            .reason
            .clone()
            .unwrap_or_else(|| "gate rejected".to_string());
        task.execution.block_phase(phase, &reason);
        task.current_phase = Some(phase.to_string());
        task.set_status(TaskStatus::Blocked)?;
        task.executor = None;
        self.save(task).await?;
        info!(task = %task.id, phase = %phase, reason = %reason, "gate rejected, task blocked");
        self.task_updated(task);
        Ok(TaskStatus::Blocked)
    }

    async fn save(&self, task: &Task) -> Result<()> {
        lock(&self.snapshots).insert(task.id.clone(), task.clone());
        let store = self.store.clone();
        let task = task.clone();
        blocking_with_timeout(self.config.store_timeout, move || store.save_task(&task)).await
    }

    fn emit(&self, task_id: &TaskId, kind: EventKind) {
        self.events.publish(Event::task(task_id, kind));
    }

    fn task_updated(&self, task: &Task) {
        self.emit(
            &task.id,
            EventKind::TaskUpdated {
                status: task.status,
                current_phase: task.current_phase.clone(),
            },
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
