use crate::controller::{Phase, Snapshot};
use crate::monitor::Breach;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Operator-facing status file, rewritten periodically by the simulator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub updated_at: String,
    pub uptime_seconds: u64,
    pub phase: Phase,
    pub connected_peer: Option<String>,
    pub monitoring: bool,
    pub pending_breach: Option<Breach>,
    pub confirmation_remaining_secs: Option<f64>,
    pub recipients: usize,
    pub samples_seen: u64,
    pub breaches: u64,
    pub alerts_sent: u64,
    pub alerts_aborted: u64,
}

impl LiveStatus {
    pub fn from_snapshot(snapshot: &Snapshot, uptime_seconds: u64) -> Self {
        Self {
            updated_at: Utc::now().to_rfc3339(),
            uptime_seconds,
            phase: snapshot.phase,
            connected_peer: snapshot.peer.clone(),
            monitoring: snapshot.monitoring,
            pending_breach: snapshot.pending,
            confirmation_remaining_secs: snapshot.confirmation_remaining_secs,
            recipients: snapshot.contacts.recipients().len(),
            samples_seen: snapshot.samples_seen,
            breaches: snapshot.breaches,
            alerts_sent: snapshot.alerts_sent,
            alerts_aborted: snapshot.alerts_aborted,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactConfiguration;
    use crate::pairing::SessionState;

    fn snapshot() -> Snapshot {
        let mut contacts = ContactConfiguration::new();
        contacts.save("A", "");
        Snapshot {
            phase: Phase::Armed,
            session: SessionState::Connected,
            peer: Some("ESP32".to_string()),
            connecting: false,
            monitoring: true,
            pending: Some(Breach {
                timestamp: 12.5,
                magnitude: 31.0,
            }),
            confirmation_remaining_secs: Some(12.0),
            alert_in_flight: false,
            contacts,
            samples_seen: 420,
            breaches: 1,
            alerts_sent: 0,
            alerts_aborted: 0,
        }
    }

    #[test]
    fn test_from_snapshot() {
        let status = LiveStatus::from_snapshot(&snapshot(), 90);
        assert_eq!(status.phase, Phase::Armed);
        assert_eq!(status.recipients, 1);
        assert_eq!(status.connected_peer.as_deref(), Some("ESP32"));
        assert_eq!(status.uptime_seconds, 90);
    }

    #[test]
    fn test_save_writes_json() {
        let path = std::env::temp_dir().join(format!("crashguard_status_{}.json", std::process::id()));
        let status = LiveStatus::from_snapshot(&snapshot(), 5);
        status.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: LiveStatus = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, status);
        assert!(text.contains("\"phase\": \"Armed\""));
        let _ = fs::remove_file(&path);
    }
}
