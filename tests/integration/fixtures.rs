//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted phase runner with per-phase outcome queues
//! - An in-memory harness wiring store, broker and events together
//! - Predefined phase lists

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use orc::core::execution::TokenUsage;
use orc::core::task::{Task, TaskId};
use orc::events::{Event, EventBroadcaster, EventKind, Subscription, Topic};
use orc::gate::GateBroker;
use orc::orchestration::{Executor, ExecutorConfig, PhaseInput, PhaseOutput, PhaseRunner};
use orc::store::{MemoryStore, Store};
use orc::workflow::{PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use orc::{Error, Result};

/// What the scripted runner does for one invocation of a phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    Succeed,
    Fail(String),
    /// Park until the run is cancelled.
    WaitForCancel,
    Panic,
}

/// A phase runner whose behavior is scripted per phase.
///
/// Queued outcomes are consumed first, then the phase's standing outcome,
/// then success.
#[derive(Default)]
pub struct ScriptedRunner {
    queued: Mutex<HashMap<String, VecDeque<Script>>>,
    standing: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<PhaseInput>>,
    parked: Notify,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot outcome for the next call of `phase`.
    pub fn push(&self, phase: &str, script: Script) {
        self.queued
            .lock()
            .unwrap()
            .entry(phase.to_string())
            .or_default()
            .push_back(script);
    }

    /// Use `script` for every call of `phase` once the queue is empty.
    pub fn always(&self, phase: &str, script: Script) {
        self.standing
            .lock()
            .unwrap()
            .insert(phase.to_string(), script);
    }

    pub fn reset(&self, phase: &str) {
        self.queued.lock().unwrap().remove(phase);
        self.standing.lock().unwrap().remove(phase);
    }

    pub fn calls(&self) -> Vec<PhaseInput> {
        self.calls.lock().unwrap().clone()
    }

    pub fn phases_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.phase).collect()
    }

    pub fn count(&self, phase: &str) -> usize {
        self.calls().iter().filter(|c| c.phase == phase).count()
    }

    /// Resolve once a `WaitForCancel` phase has been entered.
    pub async fn wait_parked(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.parked.notified())
            .await
            .expect("runner never parked");
    }

    fn next_script(&self, phase: &str) -> Script {
        if let Some(script) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(phase)
            .and_then(VecDeque::pop_front)
        {
            return script;
        }
        self.standing
            .lock()
            .unwrap()
            .get(phase)
            .cloned()
            .unwrap_or(Script::Succeed)
    }
}

#[async_trait]
impl PhaseRunner for ScriptedRunner {
    async fn run(&self, input: PhaseInput, cancel: CancellationToken) -> Result<PhaseOutput> {
        let phase = input.phase.clone();
        self.calls.lock().unwrap().push(input);
        match self.next_script(&phase) {
            Script::Succeed => Ok(PhaseOutput {
                content: format!("{} output", phase),
                tokens: TokenUsage::new(100, 50),
                cost_usd: 0.01,
                commit: Some(format!("commit-{}", phase)),
                artifacts: vec![format!("{}.md", phase)],
                session_id: Some(format!("session-{}", phase)),
            }),
            Script::Fail(message) => Err(Error::PhaseRunner { phase, message }),
            Script::WaitForCancel => {
                self.parked.notify_one();
                cancel.cancelled().await;
                Err(Error::PhaseRunner {
                    phase,
                    message: "cancelled".to_string(),
                })
            }
            Script::Panic => panic!("scripted panic in {}", phase),
        }
    }
}

/// Store, runner, broker and broadcaster for one test.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub runner: Arc<ScriptedRunner>,
    pub events: Arc<EventBroadcaster>,
    pub broker: Arc<GateBroker>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            runner: ScriptedRunner::new(),
            events: Arc::new(EventBroadcaster::new(1000)),
            broker: Arc::new(GateBroker::new()),
        }
    }

    pub fn executor(&self) -> Executor {
        self.executor_with(ExecutorConfig::default())
    }

    pub fn executor_with(&self, config: ExecutorConfig) -> Executor {
        Executor::new(self.store.clone(), self.runner.clone(), self.events.clone())
            .with_broker(self.broker.clone())
            .with_config(config)
    }

    /// Save a workflow, creating a default template for any phase that has
    /// none yet.
    pub fn workflow(&self, id: &str, phases: Vec<WorkflowPhase>) -> WorkflowId {
        let workflow_id = WorkflowId::from(id);
        for phase in &phases {
            if self.store.get_phase_template(phase.id()).unwrap().is_none() {
                self.template(PhaseTemplate::new(phase.id(), phase.id()));
            }
        }
        self.store
            .save_workflow(&Workflow::new(workflow_id.clone(), id))
            .unwrap();
        self.store
            .save_workflow_phases(&workflow_id, &phases)
            .unwrap();
        workflow_id
    }

    pub fn template(&self, template: PhaseTemplate) {
        self.store.save_phase_template(&template).unwrap();
    }

    pub fn task(&self, id: &str) -> TaskId {
        let task = Task::new(id, &format!("Task {}", id));
        self.store.save_task(&task).unwrap();
        task.id
    }

    pub fn load(&self, id: &TaskId) -> Task {
        self.store.load_task(id).unwrap().expect("task exists")
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe(Topic::All)
    }
}

/// A chain where each phase depends on the previous one.
pub fn linear(ids: &[&str]) -> Vec<WorkflowPhase> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let phase = WorkflowPhase::new(id, i as u32 + 1);
            match i.checked_sub(1) {
                Some(prev) => phase.depends_on(&[ids[prev]]),
                None => phase,
            }
        })
        .collect()
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Events of one task, in publication order.
pub fn task_events(events: Vec<Event>, task: &TaskId) -> Vec<EventKind> {
    events
        .into_iter()
        .filter(|e| e.task_id.as_ref() == Some(task))
        .map(|e| e.kind)
        .collect()
}

/// Phase ids of every `PhaseStarted` event.
pub fn started_phases(kinds: &[EventKind]) -> Vec<String> {
    kinds
        .iter()
        .filter_map(|k| match k {
            EventKind::PhaseStarted { phase, .. } => Some(phase.clone()),
            _ => None,
        })
        .collect()
}
