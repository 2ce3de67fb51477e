//! Explicit state object for the whole system.
//!
//! All transitions go through [`Controller`], which is owned by the service
//! loop. Background work (channel open, confirmation countdown, alert pathway)
//! runs as tasks that post their typed results back as [`Input`]s, so state is
//! only ever written from the loop. The screen renders [`Snapshot`]s.

use crate::alert::{run_alert, AlertDispatcher, AlertOutcome, MessageTransport};
use crate::config::CrashGuardConfig;
use crate::contacts::ContactConfiguration;
use crate::error::{ControlError, PairingError};
use crate::location::LocationProvider;
use crate::monitor::{Breach, MotionMonitor};
use crate::pairing::{self, PairingSession, RadioAdapter, RadioChannel, SessionState};
use crate::sensors::MotionSample;
use crate::service::{Command, Input};
use crate::timer::ConfirmationTimer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{Sender, WeakSender};

/// Transient, informational message for the rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    ContactsSaved,
    Paired { peer: String },
    PairingFailed(PairingError),
    MonitoringStarted,
    ConnectFirst,
    AccidentDetected { window_secs: u64, magnitude: f64 },
    LocationUnavailable,
    AlertSent { recipients: Vec<String> },
    Disconnected,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Notice::ContactsSaved => write!(f, "Contacts saved."),
            Notice::Paired { .. } => write!(f, "Connected to bike!"),
            Notice::PairingFailed(PairingError::ChannelOpenFailed(_)) => {
                write!(f, "Failed to connect to bike")
            }
            Notice::PairingFailed(err) => write!(f, "{}", err),
            Notice::MonitoringStarted => write!(f, "Accident monitoring started."),
            Notice::ConnectFirst => write!(f, "{}", ControlError::NotPaired),
            Notice::AccidentDetected { window_secs, .. } => {
                write!(f, "Accident detected! Confirm within {} seconds.", window_secs)
            }
            Notice::LocationUnavailable => write!(f, "Failed to retrieve location."),
            Notice::AlertSent { .. } => write!(f, "Accident alert sent!"),
            Notice::Disconnected => write!(f, "Disconnected from bike."),
        }
    }
}

/// On-screen toast surface
pub trait NoticeSink: Send + Sync {
    fn show(&self, notice: &Notice);
}

/// Platform collaborators the core is wired to
#[derive(Clone)]
pub struct Platform {
    pub radio: Arc<dyn RadioAdapter>,
    pub location: Arc<dyn LocationProvider>,
    pub transport: Arc<dyn MessageTransport>,
    pub notices: Arc<dyn NoticeSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No session
    Idle,
    /// Session connected, nothing pending
    Paired,
    /// Breach pending, countdown or alert running
    Armed,
}

/// Read-only view for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub session: SessionState,
    pub peer: Option<String>,
    pub connecting: bool,
    pub monitoring: bool,
    pub pending: Option<Breach>,
    pub confirmation_remaining_secs: Option<f64>,
    pub alert_in_flight: bool,
    pub contacts: ContactConfiguration,
    pub samples_seen: u64,
    pub breaches: u64,
    pub alerts_sent: u64,
    pub alerts_aborted: u64,
}

pub struct Controller {
    config: CrashGuardConfig,
    platform: Platform,
    dispatcher: Arc<AlertDispatcher>,
    inputs: WeakSender<Input>,

    contacts: ContactConfiguration,
    session: PairingSession,
    monitor: MotionMonitor,
    timer: ConfirmationTimer,
    monitoring: bool,
    alert_in_flight: bool,

    samples_seen: u64,
    breaches: u64,
    alerts_sent: u64,
    alerts_aborted: u64,
}

impl Controller {
    /// `inputs` is the loop's own channel; background results come back on it.
    pub fn new(config: CrashGuardConfig, platform: Platform, inputs: &Sender<Input>) -> Self {
        let dispatcher = Arc::new(AlertDispatcher::new(
            platform.transport.clone(),
            config.alert.map_link_base.clone(),
        ));
        let monitor = MotionMonitor::new(config.detection.threshold);

        Self {
            config,
            platform,
            dispatcher,
            inputs: inputs.downgrade(),
            contacts: ContactConfiguration::new(),
            session: PairingSession::new(),
            monitor,
            timer: ConfirmationTimer::new(),
            monitoring: false,
            alert_in_flight: false,
            samples_seen: 0,
            breaches: 0,
            alerts_sent: 0,
            alerts_aborted: 0,
        }
    }

    /// Apply one input. Returns false when the loop should stop.
    pub fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Command(command) => return self.handle_command(command),
            Input::Sample(sample) => {
                self.on_sample(&sample);
            }
            Input::PairingFinished(result) => {
                let _ = self.on_pairing_finished(result);
            }
            Input::ConfirmationElapsed { generation } => {
                self.on_confirmation_elapsed(generation);
            }
            Input::AlertFinished(outcome) => self.on_alert_finished(outcome),
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SaveContacts { contact1, contact2 } => self.save_contacts(contact1, contact2),
            Command::ConnectToBike => {
                let _ = self.connect_to_bike();
            }
            Command::StartMonitoring => {
                let _ = self.start_monitoring();
            }
            Command::Disconnect => {
                self.disconnect();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn notify(&self, notice: Notice) {
        log::info!("[notice] {}", notice);
        self.platform.notices.show(&notice);
    }

    pub fn save_contacts(&mut self, contact1: String, contact2: String) {
        self.contacts.save(contact1, contact2);
        log::info!("Contacts saved ({} recipient(s))", self.contacts.recipients().len());
        self.notify(Notice::ContactsSaved);
    }

    /// Check preconditions here, then open the channel on a background worker.
    /// The result arrives later as [`Input::PairingFinished`].
    pub fn connect_to_bike(&mut self) -> Result<(), PairingError> {
        if let Some(peer) = self.session.peer_name() {
            let peer = peer.to_string();
            log::info!("Already connected to {}", peer);
            self.notify(Notice::Paired { peer });
            return Ok(());
        }
        if self.session.is_connecting() {
            log::warn!("Pairing attempt already in flight, ignoring request");
            return Ok(());
        }

        let peer = match pairing::find_peer(self.platform.radio.as_ref(), &self.config.pairing.device_name) {
            Ok(peer) => peer,
            Err(e) => {
                log::warn!("Pairing precondition failed: {}", e);
                self.notify(Notice::PairingFailed(e.clone()));
                return Err(e);
            }
        };

        self.session.begin_attempt();
        log::info!("Opening channel to {}", peer.name);
        let radio = self.platform.radio.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = pairing::open_on_worker(radio, peer).await;
            if let Some(tx) = inputs.upgrade() {
                let _ = tx.send(Input::PairingFinished(result)).await;
            }
        });
        Ok(())
    }

    pub fn on_pairing_finished(
        &mut self,
        result: Result<Box<dyn RadioChannel>, PairingError>,
    ) -> Result<(), PairingError> {
        match self.session.finish_attempt(result) {
            Ok(()) => {
                let peer = self.session.peer_name().unwrap_or_default().to_string();
                log::info!("Paired with {}", peer);
                self.notify(Notice::Paired { peer });
                Ok(())
            }
            Err(e) => {
                self.notify(Notice::PairingFailed(e.clone()));
                Err(e)
            }
        }
    }

    pub fn start_monitoring(&mut self) -> Result<(), ControlError> {
        if !self.session.is_connected() {
            self.notify(Notice::ConnectFirst);
            return Err(ControlError::NotPaired);
        }
        self.monitoring = true;
        self.notify(Notice::MonitoringStarted);
        Ok(())
    }

    /// Close the session. An armed countdown keeps running.
    pub fn disconnect(&mut self) -> bool {
        if !self.session.disconnect() {
            return false;
        }
        self.monitoring = false;
        self.notify(Notice::Disconnected);
        true
    }

    pub fn on_sample(&mut self, sample: &MotionSample) -> Option<Breach> {
        if !self.monitoring {
            return None;
        }
        self.samples_seen += 1;

        let breach = self.monitor.observe(sample, self.session.is_connected())?;
        self.breaches += 1;
        log::warn!(
            "Impact {:.2} above {:.2} at {:.3}, awaiting confirmation",
            breach.magnitude,
            self.monitor.threshold(),
            breach.timestamp
        );

        let window = self.config.confirmation_window();
        let inputs = self.inputs.clone();
        self.timer.arm(window, move |generation| async move {
            if let Some(tx) = inputs.upgrade() {
                let _ = tx.send(Input::ConfirmationElapsed { generation }).await;
            }
        });
        self.notify(Notice::AccidentDetected {
            window_secs: window.as_secs(),
            magnitude: breach.magnitude,
        });
        Some(breach)
    }

    /// Countdown expired. Starts the alert pathway if the candidate is still
    /// pending; returns whether it did.
    pub fn on_confirmation_elapsed(&mut self, generation: u64) -> bool {
        if !self.timer.take_fire(generation) || !self.monitor.is_pending() {
            return false;
        }

        log::warn!("Confirmation window elapsed, raising alert");
        self.alert_in_flight = true;
        let location = self.platform.location.clone();
        let dispatcher = self.dispatcher.clone();
        let recipients = self.contacts.recipients();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let outcome = run_alert(location, dispatcher, recipients).await;
            if let Some(tx) = inputs.upgrade() {
                let _ = tx.send(Input::AlertFinished(outcome)).await;
            }
        });
        true
    }

    pub fn on_alert_finished(&mut self, outcome: AlertOutcome) {
        self.alert_in_flight = false;
        match outcome {
            AlertOutcome::Sent(report) => {
                self.alerts_sent += 1;
                self.monitor.clear();
                self.notify(Notice::AlertSent {
                    recipients: report.attempted,
                });
            }
            AlertOutcome::LocationUnavailable => {
                self.alerts_aborted += 1;
                if self.config.alert.clear_pending_on_location_failure {
                    self.monitor.clear();
                } else {
                    log::warn!("Candidate stays latched after failed location lookup");
                }
                self.notify(Notice::LocationUnavailable);
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.session.disconnect();
        self.monitoring = false;
        log::info!("Controller shut down");
    }

    pub fn phase(&self) -> Phase {
        if self.monitor.is_pending() {
            Phase::Armed
        } else if self.session.is_connected() {
            Phase::Paired
        } else {
            Phase::Idle
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            session: self.session.state(),
            peer: self.session.peer_name().map(str::to_string),
            connecting: self.session.is_connecting(),
            monitoring: self.monitoring,
            pending: self.monitor.pending(),
            confirmation_remaining_secs: self.timer.remaining().map(|d| d.as_secs_f64()),
            alert_in_flight: self.alert_in_flight,
            contacts: self.contacts.clone(),
            samples_seen: self.samples_seen,
            breaches: self.breaches,
            alerts_sent: self.alerts_sent,
            alerts_aborted: self.alerts_aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CollectingNotices, FixedLocation, RecordingTransport, SimulatedRadio};
    use tokio::sync::mpsc;

    struct Rig {
        controller: Controller,
        rx: mpsc::Receiver<Input>,
        _tx: mpsc::Sender<Input>,
        radio: Arc<SimulatedRadio>,
        location: Arc<FixedLocation>,
        transport: Arc<RecordingTransport>,
        notices: Arc<CollectingNotices>,
    }

    fn rig(config: CrashGuardConfig) -> Rig {
        let (tx, rx) = mpsc::channel(64);
        let radio = Arc::new(SimulatedRadio::with_peers(&["ESP32"]));
        let location = Arc::new(FixedLocation::at(48.8566, 2.3522));
        let transport = Arc::new(RecordingTransport::new());
        let notices = Arc::new(CollectingNotices::new());
        let platform = Platform {
            radio: radio.clone(),
            location: location.clone(),
            transport: transport.clone(),
            notices: notices.clone(),
        };
        Rig {
            controller: Controller::new(config, platform, &tx),
            rx,
            _tx: tx,
            radio,
            location,
            transport,
            notices,
        }
    }

    impl Rig {
        /// Deliver the next background result to the controller
        async fn pump(&mut self) {
            let input = self.rx.recv().await.expect("input");
            self.controller.handle(input);
        }

        async fn pair(&mut self) {
            self.controller.connect_to_bike().unwrap();
            self.pump().await;
            assert_eq!(self.controller.phase(), Phase::Paired);
            self.controller.start_monitoring().unwrap();
        }
    }

    fn at(m: f64) -> MotionSample {
        MotionSample::new(m, 0.0, 0.0, 0.0)
    }

    #[tokio::test]
    async fn test_start_monitoring_requires_session() {
        let mut rig = rig(CrashGuardConfig::default());
        assert_eq!(rig.controller.start_monitoring(), Err(ControlError::NotPaired));
        assert_eq!(rig.notices.texts(), vec!["Connect to bike first."]);
        assert_eq!(rig.controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_pairing_precondition_failures_notify_once() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.radio.set_enabled(false);
        assert_eq!(rig.controller.connect_to_bike(), Err(PairingError::Disabled));

        rig.radio.set_enabled(true);
        rig.radio.set_peers(&["Speaker"]);
        assert!(matches!(
            rig.controller.connect_to_bike(),
            Err(PairingError::PeerNotFound { .. })
        ));

        assert_eq!(
            rig.notices.texts(),
            vec!["Please enable Bluetooth", "Bike not found. Pair with ESP32 first."]
        );
        assert!(!rig.controller.snapshot().connecting);
        assert_eq!(rig.radio.open_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_open_failure() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.radio.fail_next_open("read failed, socket might closed");
        rig.controller.connect_to_bike().unwrap();
        assert!(rig.controller.snapshot().connecting);
        rig.pump().await;

        let snap = rig.controller.snapshot();
        assert_eq!(snap.session, SessionState::Disconnected);
        assert!(!snap.connecting);
        assert_eq!(rig.notices.texts(), vec!["Failed to connect to bike"]);
    }

    #[tokio::test]
    async fn test_disconnected_never_breaches() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.pair().await;
        rig.controller.disconnect();
        // monitoring was switched off with the session
        assert!(rig.controller.on_sample(&at(30.0)).is_none());
        assert_eq!(rig.controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_samples_ignored_before_start() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.controller.connect_to_bike().unwrap();
        rig.pump().await;
        assert!(rig.controller.on_sample(&at(30.0)).is_none());
        assert_eq!(rig.controller.snapshot().samples_seen, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breach_to_alert_two_contacts() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.controller.save_contacts("A".to_string(), "B".to_string());
        rig.pair().await;

        assert!(rig.controller.on_sample(&at(25.0)).is_some());
        assert_eq!(rig.controller.phase(), Phase::Armed);
        assert!(rig.controller.on_sample(&at(40.0)).is_none());

        let start = tokio::time::Instant::now();
        rig.pump().await; // ConfirmationElapsed
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(30));
        assert!(rig.controller.snapshot().alert_in_flight);
        rig.pump().await; // AlertFinished

        assert_eq!(rig.transport.recipients(), vec!["A", "B"]);
        assert_eq!(rig.controller.phase(), Phase::Paired);
        assert_eq!(rig.controller.snapshot().alerts_sent, 1);
        assert_eq!(rig.notices.texts().last().map(String::as_str), Some("Accident alert sent!"));

        // Re-armed: exactly one new breach
        assert!(rig.controller.on_sample(&at(22.0)).is_some());
        assert!(rig.controller.on_sample(&at(22.0)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_still_completes_alert() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.transport.fail_for("A");
        rig.controller.save_contacts("A".to_string(), "B".to_string());
        rig.pair().await;

        assert!(rig.controller.on_sample(&at(25.0)).is_some());
        rig.pump().await;
        rig.pump().await;

        // First recipient raised, second still went out
        assert_eq!(rig.transport.recipients(), vec!["B"]);
        assert_eq!(rig.controller.phase(), Phase::Paired);
        assert_eq!(rig.controller.snapshot().alerts_sent, 1);
        assert_eq!(rig.notices.texts().last().map(String::as_str), Some("Accident alert sent!"));
        assert!(rig.controller.on_sample(&at(25.0)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_contact_is_messaged() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.controller.save_contacts("A".to_string(), " ".to_string());
        rig.pair().await;
        rig.controller.on_sample(&at(25.0));
        rig.pump().await;
        rig.pump().await;
        assert_eq!(rig.transport.recipients(), vec!["A", " "]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_contact() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.controller.save_contacts("A".to_string(), String::new());
        rig.pair().await;
        rig.controller.on_sample(&at(25.0));
        rig.pump().await;
        rig.pump().await;
        assert_eq!(rig.transport.recipients(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_clears_pending_by_default() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.controller.save_contacts("A".to_string(), "B".to_string());
        rig.location.set(None);
        rig.pair().await;
        rig.controller.on_sample(&at(25.0));
        rig.pump().await;
        rig.pump().await;

        assert!(rig.transport.sent().is_empty());
        assert_eq!(rig.controller.phase(), Phase::Paired);
        assert_eq!(rig.controller.snapshot().alerts_aborted, 1);
        assert!(rig.notices.texts().contains(&"Failed to retrieve location.".to_string()));
        assert!(rig.controller.on_sample(&at(25.0)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_can_stay_latched() {
        let mut config = CrashGuardConfig::default();
        config.alert.clear_pending_on_location_failure = false;
        let mut rig = rig(config);
        rig.controller.save_contacts("A".to_string(), "B".to_string());
        rig.location.set(None);
        rig.pair().await;
        rig.controller.on_sample(&at(25.0));
        rig.pump().await;
        rig.pump().await;

        assert!(rig.transport.sent().is_empty());
        assert_eq!(rig.controller.phase(), Phase::Armed);
        assert!(rig.controller.on_sample(&at(25.0)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_ignored() {
        let mut rig = rig(CrashGuardConfig::default());
        rig.pair().await;
        rig.controller.on_sample(&at(25.0));
        assert!(!rig.controller.on_confirmation_elapsed(999));
        assert!(!rig.controller.snapshot().alert_in_flight);
    }

    #[test]
    fn test_notice_texts() {
        assert_eq!(
            Notice::AccidentDetected { window_secs: 30, magnitude: 25.0 }.to_string(),
            "Accident detected! Confirm within 30 seconds."
        );
        assert_eq!(
            Notice::PairingFailed(PairingError::ChannelOpenFailed("x".to_string())).to_string(),
            "Failed to connect to bike"
        );
        assert_eq!(
            Notice::PairingFailed(PairingError::Unavailable).to_string(),
            "Bluetooth not supported"
        );
    }
}
