//! In-memory platform collaborators.
//!
//! Used by the desktop simulator and as fakes in tests. Interior state is
//! behind `Mutex`es so one instance can be shared with the controller and
//! inspected from outside.

use crate::alert::MessageTransport;
use crate::controller::{Notice, NoticeSink};
use crate::error::TransportError;
use crate::location::{Coordinates, LocationProvider};
use crate::pairing::{PeerInfo, RadioAdapter, RadioChannel};
use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct SimulatedRadio {
    available: bool,
    enabled: AtomicBool,
    peers: Mutex<Vec<PeerInfo>>,
    next_open_error: Mutex<Option<String>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl SimulatedRadio {
    pub fn with_peers(names: &[&str]) -> Self {
        Self {
            available: true,
            enabled: AtomicBool::new(true),
            peers: Mutex::new(names.iter().map(|n| PeerInfo::named(*n)).collect()),
            next_open_error: Mutex::new(None),
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// No radio hardware at all
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::with_peers(&[])
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_peers(&self, names: &[&str]) {
        if let Ok(mut peers) = self.peers.lock() {
            *peers = names.iter().map(|n| PeerInfo::named(*n)).collect();
        }
    }

    /// Make the next `open_channel` fail with an I/O error
    pub fn fail_next_open(&self, reason: &str) {
        if let Ok(mut next) = self.next_open_error.lock() {
            *next = Some(reason.to_string());
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl RadioAdapter for SimulatedRadio {
    fn is_available(&self) -> bool {
        self.available
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn bonded_peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn open_channel(&self, peer: &PeerInfo) -> io::Result<Box<dyn RadioChannel>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failure = self.next_open_error.lock().ok().and_then(|mut e| e.take());
        if let Some(reason) = failure {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason));
        }
        Ok(Box::new(SimulatedChannel {
            peer: peer.name.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct SimulatedChannel {
    peer: String,
    closes: Arc<AtomicUsize>,
}

impl RadioChannel for SimulatedChannel {
    fn peer_name(&self) -> &str {
        &self.peer
    }

    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Location service that always answers with the same fix (or none)
pub struct FixedLocation {
    fix: Mutex<Option<Coordinates>>,
}

impl FixedLocation {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            fix: Mutex::new(Some(Coordinates::new(latitude, longitude))),
        }
    }

    pub fn none() -> Self {
        Self {
            fix: Mutex::new(None),
        }
    }

    pub fn set(&self, fix: Option<Coordinates>) {
        if let Ok(mut current) = self.fix.lock() {
            *current = fix;
        }
    }
}

impl LocationProvider for FixedLocation {
    fn last_known(&self) -> BoxFuture<'_, Option<Coordinates>> {
        let fix = self.fix.lock().ok().and_then(|f| *f);
        future::ready(fix).boxed()
    }
}

/// SMS transport that records instead of sending
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `recipient` raise instead of being recorded
    pub fn fail_for(&self, recipient: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(recipient.to_string());
        }
    }

    /// `(recipient, body)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|(to, _)| to).collect()
    }
}

impl MessageTransport for RecordingTransport {
    fn send_text(&self, recipient: &str, body: &str) -> Result<(), TransportError> {
        let fails = self
            .failing
            .lock()
            .map(|f| f.iter().any(|r| r == recipient))
            .unwrap_or(false);
        if fails {
            return Err(TransportError::new(recipient, "simulated send failure"));
        }

        log::info!("[sms] to {}: {}", recipient, body);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.to_string(), body.to_string()));
        }
        Ok(())
    }
}

/// Notice sink that keeps everything shown, for assertions
#[cfg(test)]
#[derive(Default)]
pub struct CollectingNotices {
    notices: Mutex<Vec<Notice>>,
}

#[cfg(test)]
impl CollectingNotices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.notices().iter().map(|n| n.to_string()).collect()
    }
}

#[cfg(test)]
impl NoticeSink for CollectingNotices {
    fn show(&self, notice: &Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}

/// Prints notices as toasts would appear
pub struct ConsoleNotices;

impl NoticeSink for ConsoleNotices {
    fn show(&self, notice: &Notice) {
        println!("[{}] >> {}", Utc::now().format("%H:%M:%S"), notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_is_one_shot() {
        let radio = SimulatedRadio::with_peers(&["ESP32"]);
        radio.fail_next_open("refused");
        assert!(radio.open_channel(&PeerInfo::named("ESP32")).is_err());
        assert!(radio.open_channel(&PeerInfo::named("ESP32")).is_ok());
        assert_eq!(radio.open_count(), 2);
    }

    #[tokio::test]
    async fn test_fixed_location_can_lose_fix() {
        let location = FixedLocation::at(1.0, 2.0);
        assert_eq!(location.last_known().await, Some(Coordinates::new(1.0, 2.0)));
        location.set(None);
        assert_eq!(location.last_known().await, None);
    }
}
