//! Simulated bulk-operation processor.
//!
//! Processes one target per step on a background task, pushing a progress
//! event after each and a completion event at the end. Pause, resume and
//! abort act on the running task the way a real processor would, and the
//! status poll reports its flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sweep_core::{
    EVENT_CHANNEL_SIZE, Generation, ModeParameters, OperationError, Processor, PushEvent, Stamped,
    StartRequest, StatusReport,
};

/// Default time spent on each target.
pub const DEFAULT_STEP: Duration = Duration::from_millis(250);

/// Behavior of a [`SimulatedProcessor`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Time spent on each target.
    pub step: Duration,
    /// Units reported as affected per processed target.
    pub affected_per_target: u64,
    /// Push a `Failed` event instead of processing this target (1-based).
    pub fail_at: Option<u64>,
    /// Push `Complete` after the last target. When false the processor
    /// stops silently, as if the event were lost.
    pub emit_complete: bool,
    /// Refuse every start request with this message.
    pub reject_start: Option<String>,
    pub event_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            affected_per_target: 10,
            fail_at: None,
            emit_complete: true,
            reject_start: None,
            event_capacity: EVENT_CHANNEL_SIZE,
        }
    }
}

impl SimConfig {
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_affected_per_target(mut self, affected: u64) -> Self {
        self.affected_per_target = affected;
        self
    }

    pub fn with_fail_at(mut self, target: u64) -> Self {
        self.fail_at = Some(target);
        self
    }

    /// Drop the completion event.
    pub fn without_complete(mut self) -> Self {
        self.emit_complete = false;
        self
    }

    pub fn with_reject_start(mut self, message: impl Into<String>) -> Self {
        self.reject_start = Some(message.into());
        self
    }
}

/// Flags shared with the worker task.
#[derive(Debug, Default)]
struct Flags {
    running: AtomicBool,
    paused: AtomicBool,
    abort_requested: AtomicBool,
    resumed: Notify,
}

impl Flags {
    fn report(&self) -> StatusReport {
        StatusReport {
            running: self.running.load(Ordering::SeqCst),
            paused: self.paused.load(Ordering::SeqCst),
            abort_requested: self.abort_requested.load(Ordering::SeqCst),
        }
    }
}

/// An in-process [`Processor`].
#[derive(Debug)]
pub struct SimulatedProcessor {
    config: SimConfig,
    events: broadcast::Sender<Stamped<PushEvent>>,
    flags: Arc<Flags>,
    current: Mutex<Option<CancellationToken>>,
    requests: Mutex<Vec<StartRequest>>,
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedProcessor {
    pub fn new(config: SimConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            events,
            flags: Arc::new(Flags::default()),
            current: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every start request received, accepted or not.
    pub fn requests(&self) -> Vec<StartRequest> {
        lock(&self.requests).clone()
    }

    /// Push an arbitrary event, e.g. one stamped with an old generation.
    pub fn emit(&self, generation: Generation, event: PushEvent) {
        let _ = self.events.send(Stamped::new(generation, event));
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn cancel_current(&self) {
        if let Some(cancel) = lock(&self.current).take() {
            cancel.cancel();
        }
    }
}

impl Processor for SimulatedProcessor {
    async fn start_operation(&self, request: StartRequest) -> Result<(), OperationError> {
        lock(&self.requests).push(request.clone());

        if let Some(message) = &self.config.reject_start {
            return Err(OperationError::rejected(message.clone()));
        }
        if request.parameters.target_count() == 0 {
            return Err(OperationError::rejected("No targets selected"));
        }
        if self.flags.running.swap(true, Ordering::SeqCst) {
            return Err(OperationError::rejected("An operation is already running"));
        }
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.abort_requested.store(false, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.current).replace(cancel.clone()) {
            previous.cancel();
        }

        info!(
            generation = %request.generation,
            mode = %request.parameters.mode(),
            targets = request.parameters.target_count(),
            "Simulated operation started"
        );
        tokio::spawn(work(
            request,
            self.config.clone(),
            Arc::clone(&self.flags),
            self.events.clone(),
            cancel,
        ));
        Ok(())
    }

    async fn pause_operation(&self) -> Result<(), OperationError> {
        if !self.is_running() {
            return Err(OperationError::unavailable("No operation running"));
        }
        self.flags.paused.store(true, Ordering::SeqCst);
        debug!("Simulated operation paused");
        Ok(())
    }

    async fn resume_operation(&self) -> Result<(), OperationError> {
        if !self.is_running() {
            return Err(OperationError::unavailable("No operation running"));
        }
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.resumed.notify_waiters();
        debug!("Simulated operation resumed");
        Ok(())
    }

    async fn abort_operation(&self) -> Result<(), OperationError> {
        self.flags.abort_requested.store(true, Ordering::SeqCst);
        self.cancel_current();
        self.flags.running.store(false, Ordering::SeqCst);
        self.flags.paused.store(false, Ordering::SeqCst);
        debug!("Simulated operation abort requested");
        Ok(())
    }

    async fn operation_status(&self) -> Result<StatusReport, OperationError> {
        Ok(self.flags.report())
    }

    fn subscribe(&self) -> broadcast::Receiver<Stamped<PushEvent>> {
        self.events.subscribe()
    }
}

impl Drop for SimulatedProcessor {
    fn drop(&mut self) {
        self.cancel_current();
    }
}

async fn work(
    request: StartRequest,
    config: SimConfig,
    flags: Arc<Flags>,
    events: broadcast::Sender<Stamped<PushEvent>>,
    cancel: CancellationToken,
) {
    let generation = request.generation;
    let total = request.parameters.target_count() as u64;
    let label = phase_label(&request.parameters);
    let send = |event: PushEvent| {
        let _ = events.send(Stamped::new(generation, event));
    };

    let mut affected = 0;
    for processed in 1..=total {
        if !wait_while_paused(&flags, &cancel).await {
            return stop(&flags, &cancel, generation, "aborted while paused");
        }

        tokio::select! {
            _ = cancel.cancelled() => return stop(&flags, &cancel, generation, "aborted"),
            _ = tokio::time::sleep(config.step) => {}
        }

        if config.fail_at == Some(processed) {
            send(PushEvent::Failed {
                message: format!("Target {processed} of {total} could not be processed"),
            });
            return stop(&flags, &cancel, generation, "failed");
        }

        affected += config.affected_per_target;
        send(PushEvent::progress(processed, total, label, affected));
    }

    if config.emit_complete && !cancel.is_cancelled() {
        send(PushEvent::Complete);
    }
    stop(&flags, &cancel, generation, "finished");
}

/// Block while paused. Returns false if cancelled.
async fn wait_while_paused(flags: &Flags, cancel: &CancellationToken) -> bool {
    loop {
        let resumed = flags.resumed.notified();
        tokio::pin!(resumed);
        resumed.as_mut().enable();

        if !flags.paused.load(Ordering::SeqCst) {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut resumed => {}
        }
    }
}

/// Clear the running flags unless an abort already did, possibly before a
/// newer run started.
fn stop(flags: &Flags, cancel: &CancellationToken, generation: Generation, reason: &str) {
    if !cancel.is_cancelled() {
        flags.running.store(false, Ordering::SeqCst);
        flags.paused.store(false, Ordering::SeqCst);
    }
    debug!(%generation, reason, "Simulated operation stopped");
}

fn phase_label(parameters: &ModeParameters) -> &'static str {
    match parameters {
        ModeParameters::Messages { options, .. } if options.simulation => "simulating",
        ModeParameters::Messages { .. } => "deleting",
        ModeParameters::Servers { .. } => "leaving",
        ModeParameters::Identity { .. } => "removing",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
