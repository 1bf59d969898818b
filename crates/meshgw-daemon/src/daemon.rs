//! Daemon - registry and lifecycle of coordination tasks

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use meshgw_core::{channel, ChannelReceiver, ChannelSender, ReadinessGate};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DaemonError, TaskError};
use crate::task::{Envelope, ExecutionParams, Task, TaskContext, TaskState};

type TaskFactory = Box<dyn FnOnce(&TaskContext) -> Result<Box<dyn Task>, TaskError> + Send>;

/// State of one task, shared between the daemon and the task's runner
struct StateCell {
    name: String,
    state: RwLock<TaskState>,
}

impl StateCell {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: RwLock::new(TaskState::Registered),
        })
    }

    fn get(&self) -> TaskState {
        *self.state.read()
    }

    fn transition(&self, next: TaskState) -> Result<(), DaemonError> {
        let mut state = self.state.write();
        self.apply(&mut state, next)
    }

    /// Move to STOPPED or FAILED unless a final state was already recorded
    fn finish(&self, success: bool) {
        let mut state = self.state.write();
        if state.is_terminal() {
            return;
        }
        let next = if success {
            TaskState::Stopped
        } else {
            TaskState::Failed
        };
        if let Err(e) = self.apply(&mut state, next) {
            warn!(task = %self.name, error = %e, "Ignoring invalid final transition");
        }
    }

    fn apply(&self, state: &mut TaskState, next: TaskState) -> Result<(), DaemonError> {
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(DaemonError::InvalidTransition {
                task: self.name.clone(),
                from,
                to: next,
            });
        }
        debug!(task = %self.name, %from, to = %next, "Task state change");
        *state = next;
        Ok(())
    }
}

/// Registered task, resolved into a running task by [`Daemon::start`]
struct TaskDescriptor {
    name: String,
    factory: Option<TaskFactory>,
    routing: Option<String>,
    params: ExecutionParams,
    state: Arc<StateCell>,
}

/// Channel bindings of one task, resolved before anything is spawned
struct Wiring {
    inbox: (ChannelSender<Envelope>, ChannelReceiver<Envelope>),
    outbox: Option<ChannelSender<Envelope>>,
}

struct RunningTask {
    name: String,
    handle: JoinHandle<Result<(), TaskError>>,
}

/// Registry of named tasks wired together by channels
///
/// Tasks are registered with a factory and optional routing, optionally
/// configured, then started together. Startup is two-phase: every task is
/// launched and initialized first, and only then is the readiness gate set.
///
/// Each task's runner records its own final state as soon as `run`
/// returns, so [`Daemon::state`] reflects a failure before anyone joins.
pub struct Daemon {
    gate: ReadinessGate,
    descriptors: Vec<TaskDescriptor>,
    shutdown: CancellationToken,
    running: Vec<RunningTask>,
    failures: (ChannelSender<DaemonError>, ChannelReceiver<DaemonError>),
    started: bool,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Self::with_gate(ReadinessGate::new())
    }

    /// Create a daemon that sets an existing gate
    pub fn with_gate(gate: ReadinessGate) -> Self {
        Self {
            gate,
            descriptors: Vec::new(),
            shutdown: CancellationToken::new(),
            running: Vec::new(),
            failures: channel(),
            started: false,
        }
    }

    /// The gate set once every task is running
    pub fn gate(&self) -> ReadinessGate {
        self.gate.clone()
    }

    /// Create a channel for passing to task constructors
    pub fn create_channel<T>(&self) -> (ChannelSender<T>, ChannelReceiver<T>) {
        channel()
    }

    /// Register a task
    ///
    /// `factory` is called with `args` and the task's context when the
    /// daemon starts. `routing` names the task whose inbox receives this
    /// task's output; it is resolved at start, so it may name a task
    /// registered later.
    pub fn register<T, A, F>(
        &mut self,
        name: &str,
        factory: F,
        args: A,
        routing: Option<&str>,
    ) -> Result<(), DaemonError>
    where
        T: Task,
        A: Send + 'static,
        F: FnOnce(A, &TaskContext) -> Result<T, TaskError> + Send + 'static,
    {
        if self.started {
            return Err(DaemonError::AlreadyStarted);
        }
        if self.descriptor(name).is_some() {
            return Err(DaemonError::DuplicateTask(name.to_string()));
        }

        let factory: TaskFactory = Box::new(move |ctx: &TaskContext| {
            factory(args, ctx).map(|task| Box::new(task) as Box<dyn Task>)
        });

        self.descriptors.push(TaskDescriptor {
            name: name.to_string(),
            factory: Some(factory),
            routing: routing.map(str::to_string),
            params: ExecutionParams::default(),
            state: StateCell::new(name),
        });

        info!(task = %name, routing = ?routing, "Registered task");
        Ok(())
    }

    /// Attach execution parameters to a registered task
    pub fn configure(&mut self, name: &str, params: ExecutionParams) -> Result<(), DaemonError> {
        if self.started {
            return Err(DaemonError::AlreadyStarted);
        }
        if params.workers == 0 {
            return Err(DaemonError::InvalidParams {
                task: name.to_string(),
                reason: "workers must be at least 1".to_string(),
            });
        }

        let descriptor = self
            .descriptor_mut(name)
            .ok_or_else(|| DaemonError::UnknownTask(name.to_string()))?;
        descriptor.state.transition(TaskState::Configured)?;
        descriptor.params = params;
        Ok(())
    }

    /// Current state of a task
    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.descriptor(name).map(|d| d.state.get())
    }

    /// Registered task names, in registration order
    pub fn task_names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Launch every registered task
    ///
    /// Routing is resolved before anything is spawned, so wiring mistakes
    /// are reported without side effects. Each task is then spawned and
    /// initialized concurrently. If any task fails to initialize, every
    /// task is stopped, the gate stays unset and the first failing task (in
    /// registration order) is reported.
    ///
    /// With `gate_after_all_running` the gate is set once every task is
    /// initialized; otherwise the gate is left alone.
    pub async fn start(&mut self, gate_after_all_running: bool) -> Result<(), DaemonError> {
        if self.started {
            return Err(DaemonError::AlreadyStarted);
        }

        let wiring = self.resolve_wiring()?;
        for descriptor in &mut self.descriptors {
            if descriptor.state.get() == TaskState::Registered {
                descriptor.state.transition(TaskState::Configured)?;
            }
        }

        self.started = true;
        info!(tasks = self.descriptors.len(), "Starting daemon");

        let mut reports = Vec::with_capacity(self.descriptors.len());
        let mut failure: Option<(String, String)> = None;

        for (descriptor, Wiring { inbox, outbox }) in self.descriptors.iter_mut().zip(wiring) {
            let ctx = TaskContext::wired(
                &descriptor.name,
                descriptor.params.clone(),
                self.gate.clone(),
                inbox,
                outbox,
                self.shutdown.child_token(),
            );

            let built = match descriptor.factory.take() {
                Some(factory) => factory(&ctx),
                None => Err(TaskError::Init("task factory already used".to_string())),
            };
            let task = match built {
                Ok(task) => task,
                Err(e) => {
                    error!(task = %descriptor.name, error = %e, "Failed to construct task");
                    descriptor.state.transition(TaskState::Failed)?;
                    failure = Some((descriptor.name.clone(), e.to_string()));
                    break;
                }
            };

            let (ready_tx, ready_rx) = oneshot::channel();
            reports.push(ready_rx);
            self.running.push(RunningTask {
                name: descriptor.name.clone(),
                handle: tokio::spawn(run_task(
                    task,
                    ctx,
                    Arc::clone(&descriptor.state),
                    ready_tx,
                    self.failures.0.clone(),
                )),
            });
        }

        let names: Vec<String> = self.running.iter().map(|r| r.name.clone()).collect();
        for (name, report) in names.into_iter().zip(join_all(reports).await) {
            let outcome = match report {
                Ok(outcome) => outcome,
                Err(_) => Err(TaskError::Init(
                    "task exited before reporting initialization".to_string(),
                )),
            };
            if let Err(e) = outcome {
                error!(task = %name, error = %e, "Task failed to initialize");
                if let Some(descriptor) = self.descriptor(&name) {
                    descriptor.state.finish(false);
                }
                failure.get_or_insert((name, e.to_string()));
            }
        }

        if let Some((name, reason)) = failure {
            self.abort_start().await;
            return Err(DaemonError::TaskInitialization { name, reason });
        }

        if gate_after_all_running && self.gate.set() {
            info!("All tasks running, readiness gate set");
        }

        Ok(())
    }

    /// Signal every task to stop accepting input
    ///
    /// Items still queued in channels may be dropped. The readiness gate is
    /// not reset.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping daemon");
            self.shutdown.cancel();
        }
    }

    /// Wait for the first task that fails after start
    ///
    /// Pending for as long as every task keeps running or stops cleanly.
    pub async fn failure(&self) -> DaemonError {
        match self.failures.1.recv().await {
            Some(e) => e,
            None => std::future::pending().await,
        }
    }

    /// Wait for every running task to finish
    ///
    /// Tasks that return `Ok` end up STOPPED, tasks that return an error or
    /// panic end up FAILED. The first failure is returned.
    pub async fn join(&mut self) -> Result<(), DaemonError> {
        if !self.started {
            return Err(DaemonError::NotStarted);
        }

        let mut first_failure = None;
        for (name, outcome) in self.collect_running().await {
            self.finish(&name, outcome.is_ok());
            if let Err(e) = outcome {
                first_failure.get_or_insert(DaemonError::TaskFailed {
                    name,
                    reason: e.to_string(),
                });
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(&mut self) -> Result<(), DaemonError> {
        self.stop();
        self.join().await
    }

    fn resolve_wiring(&self) -> Result<Vec<Wiring>, DaemonError> {
        let inboxes: Vec<_> = self
            .descriptors
            .iter()
            .map(|_| channel::<Envelope>())
            .collect();

        let mut wiring = Vec::with_capacity(self.descriptors.len());
        for (descriptor, inbox) in self.descriptors.iter().zip(&inboxes) {
            let outbox = match &descriptor.routing {
                None => None,
                Some(target) if *target == descriptor.name => {
                    return Err(DaemonError::SelfRoute(descriptor.name.clone()));
                }
                Some(target) => {
                    let idx = self
                        .descriptors
                        .iter()
                        .position(|d| d.name == *target)
                        .ok_or_else(|| DaemonError::UnknownRoute {
                            task: descriptor.name.clone(),
                            target: target.clone(),
                        })?;
                    debug!(task = %descriptor.name, target = %target, "Routing task output");
                    Some(inboxes[idx].0.clone())
                }
            };
            wiring.push(Wiring {
                inbox: inbox.clone(),
                outbox,
            });
        }

        Ok(wiring)
    }

    /// Stop tasks launched by a start that failed
    async fn abort_start(&mut self) {
        warn!("Aborting daemon start, stopping launched tasks");
        self.shutdown.cancel();
        for (name, outcome) in self.collect_running().await {
            self.finish(&name, outcome.is_ok());
        }
    }

    async fn collect_running(&mut self) -> Vec<(String, Result<(), TaskError>)> {
        let running = std::mem::take(&mut self.running);
        let names: Vec<String> = running.iter().map(|r| r.name.clone()).collect();
        let results = join_all(running.into_iter().map(|r| r.handle)).await;
        names
            .into_iter()
            .zip(results.into_iter().map(flatten_join))
            .collect()
    }

    fn finish(&self, name: &str, success: bool) {
        if let Some(descriptor) = self.descriptor(name) {
            descriptor.state.finish(success);
        }
    }

    fn descriptor(&self, name: &str) -> Option<&TaskDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    fn descriptor_mut(&mut self, name: &str) -> Option<&mut TaskDescriptor> {
        self.descriptors.iter_mut().find(|d| d.name == name)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Initialize and run one task, recording its state as it goes
///
/// RUNNING is recorded before initialization is reported, and the final
/// state as soon as `run` returns or panics. Runtime failures are logged
/// and sent to `failures`.
async fn run_task(
    mut task: Box<dyn Task>,
    ctx: TaskContext,
    state: Arc<StateCell>,
    ready: oneshot::Sender<Result<(), TaskError>>,
    failures: ChannelSender<DaemonError>,
) -> Result<(), TaskError> {
    if let Err(e) = task.initialize(&ctx).await {
        state.finish(false);
        let _ = ready.send(Err(e.clone()));
        return Err(e);
    }
    if let Err(e) = state.transition(TaskState::Running) {
        let _ = ready.send(Err(TaskError::Init(e.to_string())));
        return Err(TaskError::Init(e.to_string()));
    }
    let _ = ready.send(Ok(()));
    debug!(task = %ctx.name(), "Task initialized");

    let name = ctx.name().to_string();
    let outcome = match AssertUnwindSafe(task.run(ctx)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(TaskError::Panicked(panic_message(panic))),
    };

    match &outcome {
        Ok(()) => {
            info!(task = %name, "Task stopped");
            state.finish(true);
        }
        Err(e) => {
            error!(task = %name, error = %e, "Task failed");
            state.finish(false);
            let _ = failures.send(DaemonError::TaskFailed {
                name,
                reason: e.to_string(),
            });
        }
    }
    outcome
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

fn flatten_join(result: Result<Result<(), TaskError>, JoinError>) -> Result<(), TaskError> {
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(TaskError::Panicked(e.to_string())),
        Err(e) => Err(TaskError::Runtime(e.to_string())),
    }
}
