use crate::error::{BridgeError, JResult};
use crashguard::alert::MessageTransport;
use crashguard::controller::{Notice, NoticeSink};
use crashguard::error::TransportError;
use crashguard::location::{Coordinates, LocationProvider};
use crashguard::pairing::{PeerInfo, RadioAdapter, RadioChannel};
use crossbeam::channel::{unbounded, Receiver, Sender};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Work the Kotlin side must carry out, polled as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformRequest {
    OpenChannel { peer: String },
    CloseChannel { peer: String },
    QueryLocation,
    SendText { recipient: String, body: String },
    ShowNotice { text: String },
}

/// Queue of platform requests, drained by `pollRequest`
pub struct Outbox {
    tx: Sender<PlatformRequest>,
    rx: Receiver<PlatformRequest>,
}

impl Outbox {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, request: PlatformRequest) {
        // Both ends live in self, so the send cannot fail
        let _ = self.tx.send(request);
    }

    pub fn poll(&self) -> Option<PlatformRequest> {
        self.rx.try_recv().ok()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

struct RadioState {
    available: bool,
    enabled: bool,
    peers: Vec<PeerInfo>,
}

/// Bluetooth as reported by Kotlin. `open_channel` asks Kotlin to open the
/// socket and blocks the pairing worker until `channelResult` arrives.
pub struct BridgeRadio {
    outbox: Arc<Outbox>,
    state: Mutex<RadioState>,
    awaiting_open: AtomicBool,
    closed: AtomicBool,
    results_tx: Sender<Result<(), String>>,
    results_rx: Receiver<Result<(), String>>,
}

impl BridgeRadio {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self {
            outbox,
            state: Mutex::new(RadioState {
                available: false,
                enabled: false,
                peers: Vec::new(),
            }),
            awaiting_open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            results_tx,
            results_rx,
        }
    }

    pub fn update(&self, available: bool, enabled: bool, peer_names: Vec<String>) -> JResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BridgeError::Internal("Failed to acquire radio state lock".to_string()))?;
        state.available = available;
        state.enabled = enabled;
        state.peers = peer_names.into_iter().map(PeerInfo::named).collect();
        Ok(())
    }

    /// Result of the socket connect Kotlin performed for `OpenChannel`
    pub fn complete_open(&self, result: Result<(), String>) -> JResult<()> {
        if !self.awaiting_open.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::InvalidState(
                "No channel open in progress".to_string(),
            ));
        }
        self.results_tx
            .send(result)
            .map_err(|_| BridgeError::Internal("Channel result queue closed".to_string()))
    }

    /// Refuse further opens and release a worker parked in `open_channel`.
    /// Safe to call before the worker has reached the radio.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.awaiting_open.swap(false, Ordering::SeqCst) {
            let _ = self.results_tx.send(Err("bridge shut down".to_string()));
        }
    }

    fn read_state<T>(&self, f: impl FnOnce(&RadioState) -> T, fallback: T) -> T {
        self.state.lock().map(|s| f(&*s)).unwrap_or(fallback)
    }
}

impl RadioAdapter for BridgeRadio {
    fn is_available(&self) -> bool {
        self.read_state(|s| s.available, false)
    }

    fn is_enabled(&self) -> bool {
        self.read_state(|s| s.enabled, false)
    }

    fn bonded_peers(&self) -> Vec<PeerInfo> {
        self.read_state(|s| s.peers.clone(), Vec::new())
    }

    fn open_channel(&self, peer: &PeerInfo) -> io::Result<Box<dyn RadioChannel>> {
        self.awaiting_open.store(true, Ordering::SeqCst);
        // Checked after publishing the flag: either we see `closed` here, or
        // `close` sees the flag and sends us a result
        if self.closed.load(Ordering::SeqCst) {
            self.awaiting_open.store(false, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bridge shut down"));
        }
        self.outbox.push(PlatformRequest::OpenChannel {
            peer: peer.name.clone(),
        });

        // results_tx lives in self, so recv only returns with an answer
        let result = self
            .results_rx
            .recv()
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        result.map_err(|msg| io::Error::new(io::ErrorKind::Other, msg))?;

        Ok(Box::new(BridgeChannel {
            peer: peer.name.clone(),
            outbox: self.outbox.clone(),
        }))
    }
}

struct BridgeChannel {
    peer: String,
    outbox: Arc<Outbox>,
}

impl RadioChannel for BridgeChannel {
    fn peer_name(&self) -> &str {
        &self.peer
    }

    fn close(&mut self) -> io::Result<()> {
        self.outbox.push(PlatformRequest::CloseChannel {
            peer: self.peer.clone(),
        });
        Ok(())
    }
}

/// Fused location `lastLocation`, answered through `locationResult`
pub struct BridgeLocation {
    outbox: Arc<Outbox>,
    pending: Mutex<Option<oneshot::Sender<Option<Coordinates>>>>,
}

impl BridgeLocation {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            outbox,
            pending: Mutex::new(None),
        }
    }

    pub fn complete(&self, fix: Option<Coordinates>) -> JResult<()> {
        let waiter = self
            .pending
            .lock()
            .map_err(|_| BridgeError::Internal("Failed to acquire location lock".to_string()))?
            .take()
            .ok_or_else(|| BridgeError::InvalidState("No location query in progress".to_string()))?;
        // Receiver gone means the alert task was dropped; nothing to do
        let _ = waiter.send(fix);
        Ok(())
    }
}

impl LocationProvider for BridgeLocation {
    fn last_known(&self) -> BoxFuture<'_, Option<Coordinates>> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            // A superseded query resolves as "no fix"
            *pending = Some(tx);
        }
        self.outbox.push(PlatformRequest::QueryLocation);
        async move { rx.await.ok().flatten() }.boxed()
    }
}

/// SmsManager.sendTextMessage, performed by Kotlin. No receipt comes back.
pub struct BridgeTransport {
    outbox: Arc<Outbox>,
}

impl BridgeTransport {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

impl MessageTransport for BridgeTransport {
    fn send_text(&self, recipient: &str, body: &str) -> Result<(), TransportError> {
        self.outbox.push(PlatformRequest::SendText {
            recipient: recipient.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Toasts
pub struct BridgeNotices {
    outbox: Arc<Outbox>,
}

impl BridgeNotices {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

impl NoticeSink for BridgeNotices {
    fn show(&self, notice: &Notice) {
        self.outbox.push(PlatformRequest::ShowNotice {
            text: notice.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_string(&PlatformRequest::SendText {
            recipient: "+15550100".to_string(),
            body: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"send_text","recipient":"+15550100","body":"hi"}"#);
        assert_eq!(
            serde_json::to_string(&PlatformRequest::QueryLocation).unwrap(),
            r#"{"type":"query_location"}"#
        );
    }

    #[test]
    fn test_open_channel_waits_for_kotlin() {
        let outbox = Arc::new(Outbox::new());
        let radio = Arc::new(BridgeRadio::new(outbox.clone()));
        radio.update(true, true, vec!["ESP32".to_string()]).unwrap();
        assert_eq!(radio.bonded_peers(), vec![PeerInfo::named("ESP32")]);

        let worker = {
            let radio = radio.clone();
            thread::spawn(move || radio.open_channel(&PeerInfo::named("ESP32")).map(|c| c.peer_name().to_string()))
        };

        // Wait for the request to show up, then answer it
        let mut request = None;
        for _ in 0..200 {
            request = outbox.poll();
            if request.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(request, Some(PlatformRequest::OpenChannel { peer: "ESP32".to_string() }));
        radio.complete_open(Ok(())).unwrap();

        assert_eq!(worker.join().unwrap().unwrap(), "ESP32");
    }

    #[test]
    fn test_open_failure_and_stale_result() {
        let outbox = Arc::new(Outbox::new());
        let radio = Arc::new(BridgeRadio::new(outbox.clone()));
        assert!(matches!(
            radio.complete_open(Ok(())),
            Err(BridgeError::InvalidState(_))
        ));

        let worker = {
            let radio = radio.clone();
            thread::spawn(move || radio.open_channel(&PeerInfo::named("ESP32")).is_err())
        };
        while outbox.poll().is_none() {
            thread::sleep(Duration::from_millis(5));
        }
        radio.complete_open(Err("read failed".to_string())).unwrap();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_close_before_open_releases_worker() {
        let outbox = Arc::new(Outbox::new());
        let radio = Arc::new(BridgeRadio::new(outbox.clone()));
        // Nothing parked yet
        radio.close();

        let worker = {
            let radio = radio.clone();
            thread::spawn(move || radio.open_channel(&PeerInfo::named("ESP32")).is_err())
        };
        assert!(worker.join().unwrap());
        assert_eq!(outbox.poll(), None);
    }

    #[test]
    fn test_close_releases_parked_open() {
        let outbox = Arc::new(Outbox::new());
        let radio = Arc::new(BridgeRadio::new(outbox.clone()));
        let worker = {
            let radio = radio.clone();
            thread::spawn(move || radio.open_channel(&PeerInfo::named("ESP32")).is_err())
        };
        while outbox.poll().is_none() {
            thread::sleep(Duration::from_millis(5));
        }
        radio.close();
        assert!(worker.join().unwrap());
        assert!(matches!(
            radio.complete_open(Ok(())),
            Err(BridgeError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_location_round_trip() {
        let outbox = Arc::new(Outbox::new());
        let location = BridgeLocation::new(outbox.clone());

        let query = location.last_known();
        assert_eq!(outbox.poll(), Some(PlatformRequest::QueryLocation));
        location.complete(Some(Coordinates::new(1.0, 2.0))).unwrap();
        assert_eq!(query.await, Some(Coordinates::new(1.0, 2.0)));

        assert!(location.complete(None).is_err());
    }

    #[tokio::test]
    async fn test_superseded_query_has_no_fix() {
        let outbox = Arc::new(Outbox::new());
        let location = BridgeLocation::new(outbox);
        let first = location.last_known();
        let second = location.last_known();
        location.complete(None).unwrap();
        assert_eq!(first.await, None);
        assert_eq!(second.await, None);
    }

    #[test]
    fn test_notices_and_sms_are_queued() {
        let outbox = Arc::new(Outbox::new());
        BridgeNotices::new(outbox.clone()).show(&Notice::ConnectFirst);
        BridgeTransport::new(outbox.clone()).send_text("A", "body").unwrap();

        assert_eq!(
            outbox.poll(),
            Some(PlatformRequest::ShowNotice { text: "Connect to bike first.".to_string() })
        );
        assert!(matches!(outbox.poll(), Some(PlatformRequest::SendText { .. })));
        assert_eq!(outbox.poll(), None);
    }
}
