//! The single event-dispatch context.
//!
//! One task owns the [`Controller`] and applies inputs in arrival order:
//! screen commands, motion samples, and results handed back from background
//! tasks. Nothing else touches controller state.

use crate::alert::AlertOutcome;
use crate::config::CrashGuardConfig;
use crate::controller::{Controller, Platform, Snapshot};
use crate::error::{ControlError, PairingError};
use crate::pairing::RadioChannel;
use crate::sensors::MotionSample;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const INPUT_CAPACITY: usize = 512;

/// Actions from the screen
pub enum Command {
    SaveContacts { contact1: String, contact2: String },
    ConnectToBike,
    StartMonitoring,
    Disconnect,
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

pub enum Input {
    Command(Command),
    Sample(MotionSample),
    PairingFinished(Result<Box<dyn RadioChannel>, PairingError>),
    ConfirmationElapsed { generation: u64 },
    AlertFinished(AlertOutcome),
}

/// Cloneable sender side of the service loop
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Input>,
}

impl ServiceHandle {
    pub async fn send(&self, command: Command) -> Result<(), ControlError> {
        self.tx
            .send(Input::Command(command))
            .await
            .map_err(|_| ControlError::ServiceStopped)
    }

    /// For callers outside the runtime (JNI threads). Must not be called from
    /// async code.
    pub fn send_blocking(&self, command: Command) -> Result<(), ControlError> {
        self.tx
            .blocking_send(Input::Command(command))
            .map_err(|_| ControlError::ServiceStopped)
    }

    /// Non-blocking sample delivery. `Ok(false)` means the queue was full and
    /// the sample was dropped.
    pub fn try_push_sample(&self, sample: MotionSample) -> Result<bool, ControlError> {
        match self.tx.try_send(Input::Sample(sample)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(ControlError::ServiceStopped),
        }
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| ControlError::ServiceStopped)
    }

    pub fn snapshot_blocking(&self) -> Result<Snapshot, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send_blocking(Command::Snapshot(reply))?;
        rx.blocking_recv().map_err(|_| ControlError::ServiceStopped)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the loop on the current runtime
pub fn spawn(config: CrashGuardConfig, platform: Platform) -> (ServiceHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
    let controller = Controller::new(config, platform, &tx);
    let task = tokio::spawn(run(controller, rx));
    (ServiceHandle { tx }, task)
}

/// Runs until `Shutdown` or until every handle is dropped
pub async fn run(mut controller: Controller, mut rx: mpsc::Receiver<Input>) {
    log::info!("CrashGuard service started");
    while let Some(input) = rx.recv().await {
        if !controller.handle(input) {
            break;
        }
    }
    controller.shutdown();
    log::info!("CrashGuard service stopped");
}
