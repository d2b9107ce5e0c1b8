//! Event bridge: feeds pushed events and periodic status polls into the
//! operation controller.
//!
//! The bridge lives as long as its [`BridgeHandle`]. Unmounting, or dropping
//! the handle, cancels the subscription and the poll loop whether or not an
//! operation or a status poll is in flight. At most one poll is outstanding;
//! ticks are skipped until it returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sweep_core::{
    BridgeConfig, Generation, OperationError, Processor, PushEvent, Stamped, StatusReport,
};

use crate::controller::OperationController;
use crate::reconcile::{Reconciler, Signal};

type EventReceiver = broadcast::Receiver<Stamped<PushEvent>>;

/// Mounts the push/poll loop for a controller.
pub struct EventBridge;

impl EventBridge {
    /// Subscribe to the controller's processor and start polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount<P>(controller: Arc<OperationController<P>>, config: BridgeConfig) -> BridgeHandle
    where
        P: Processor + 'static,
    {
        let cancel = CancellationToken::new();
        let events = controller.processor().subscribe();
        let reconciler = Reconciler::new(&config);
        debug!(poll_interval_ms = config.poll_interval_ms, "Mounting event bridge");

        let task = tokio::spawn(run(
            controller,
            reconciler,
            events,
            config,
            cancel.clone(),
        ));

        BridgeHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owns a mounted bridge. Dropping it tears the bridge down.
#[derive(Debug)]
pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Check if the bridge loop is still running.
    pub fn is_mounted(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Tear the bridge down and wait for its loop to exit.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Event bridge task ended abnormally");
            }
        }
        debug!("Event bridge unmounted");
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<P: Processor + 'static>(
    controller: Arc<OperationController<P>>,
    reconciler: Reconciler,
    events: EventReceiver,
    config: BridgeConfig,
    cancel: CancellationToken,
) {
    let mut events = Some(events);
    let mut poll: Option<PollFuture> = None;
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = async {
                if let Some(rx) = &mut events {
                    rx.recv().await
                } else {
                    std::future::pending().await
                }
            } => {
                match result {
                    Ok(event) => {
                        controller.apply(event.map(Signal::Push), &reconciler);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event bridge fell behind; polling will recover");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Processor event stream closed");
                        events = None;
                    }
                }
            }

            (generation, result) = async {
                if let Some(pending) = &mut poll {
                    pending.await
                } else {
                    std::future::pending().await
                }
            } => {
                poll = None;
                match result {
                    Ok(report) => {
                        if let Some(rx) = events.as_mut() {
                            drain(&controller, &reconciler, rx);
                        }
                        let signal = Stamped::new(generation, Signal::Poll(report));
                        controller.apply(signal, &reconciler);
                    }
                    Err(err) => warn!(%generation, error = %err, "Status poll failed"),
                }
            }

            _ = ticker.tick(), if poll.is_none() => {
                poll = issue_poll(&controller);
            }
        }
    }
}

type PollFuture = Pin<Box<dyn Future<Output = (Generation, PollResult)> + Send>>;

type PollResult = Result<StatusReport, OperationError>;

/// Start a status poll for the active operation, stamped with the generation
/// current when it was issued.
///
/// The poll runs as its own branch of the bridge loop, so pushed events and
/// cancellation are served while it is outstanding.
fn issue_poll<P: Processor + 'static>(controller: &OperationController<P>) -> Option<PollFuture> {
    if !controller.status().is_active() {
        return None;
    }
    let generation = controller.generation();
    let processor = Arc::clone(controller.processor());
    Some(Box::pin(async move {
        (generation, processor.operation_status().await)
    }))
}

/// Merge pushed events that are already queued, so a pending terminal event
/// wins over the poll it raced.
fn drain<P: Processor>(
    controller: &OperationController<P>,
    reconciler: &Reconciler,
    rx: &mut EventReceiver,
) {
    loop {
        match rx.try_recv() {
            Ok(event) => {
                controller.apply(event.map(Signal::Push), reconciler);
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event bridge fell behind; polling will recover");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
