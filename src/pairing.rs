use crate::error::PairingError;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;

/// A bonded peer as listed by the radio subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
}

impl PeerInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An open duplex channel to the bike unit. Nothing is read from it; holding
/// it open is what gates detection.
pub trait RadioChannel: Send {
    fn peer_name(&self) -> &str;
    fn close(&mut self) -> io::Result<()>;
}

/// Platform short-range radio (Bluetooth on Android)
pub trait RadioAdapter: Send + Sync {
    fn is_available(&self) -> bool;
    fn is_enabled(&self) -> bool;
    fn bonded_peers(&self) -> Vec<PeerInfo>;

    /// Blocking open. There is no timeout, so this may hold the calling worker
    /// for as long as the platform call does.
    fn open_channel(&self, peer: &PeerInfo) -> io::Result<Box<dyn RadioChannel>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// The single link to the bike unit
#[derive(Default)]
pub struct PairingSession {
    channel: Option<Box<dyn RadioChannel>>,
    connecting: bool,
}

impl PairingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.channel.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.peer_name())
    }

    /// Mark an attempt as in flight. Returns false if one already is.
    pub fn begin_attempt(&mut self) -> bool {
        if self.connecting {
            return false;
        }
        self.connecting = true;
        true
    }

    /// Apply the result of a background open
    pub fn finish_attempt(&mut self, result: Result<Box<dyn RadioChannel>, PairingError>) -> Result<(), PairingError> {
        self.connecting = false;
        let channel = result?;
        if let Some(mut old) = self.channel.replace(channel) {
            let _ = old.close();
        }
        Ok(())
    }

    /// Close the channel. Returns false if there was nothing to close.
    pub fn disconnect(&mut self) -> bool {
        match self.channel.take() {
            Some(mut channel) => {
                if let Err(e) = channel.close() {
                    log::warn!("Closing channel to {} failed: {}", channel.peer_name(), e);
                }
                true
            }
            None => false,
        }
    }
}

/// Precondition checks, in the order the platform reports them
pub fn find_peer(adapter: &dyn RadioAdapter, device_name: &str) -> Result<PeerInfo, PairingError> {
    if !adapter.is_available() {
        return Err(PairingError::Unavailable);
    }
    if !adapter.is_enabled() {
        return Err(PairingError::Disabled);
    }
    adapter
        .bonded_peers()
        .into_iter()
        .find(|peer| peer.name == device_name)
        .ok_or_else(|| PairingError::PeerNotFound {
            name: device_name.to_string(),
        })
}

/// Open the channel on the blocking pool so the event loop stays responsive
pub async fn open_on_worker(
    adapter: Arc<dyn RadioAdapter>,
    peer: PeerInfo,
) -> Result<Box<dyn RadioChannel>, PairingError> {
    let name = peer.name.clone();
    let joined = tokio::task::spawn_blocking(move || adapter.open_channel(&peer)).await;

    match joined {
        Ok(Ok(channel)) => {
            log::info!("Channel open to {}", name);
            Ok(channel)
        }
        Ok(Err(e)) => {
            log::error!("Connection to {} failed: {}", name, e);
            Err(PairingError::ChannelOpenFailed(e.to_string()))
        }
        Err(e) => {
            log::error!("Pairing worker for {} died: {}", name, e);
            Err(PairingError::ChannelOpenFailed(e.to_string()))
        }
    }
}
