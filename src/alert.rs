use crate::error::TransportError;
use crate::location::{Coordinates, LocationProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Platform short-message service. No delivery receipt: `Ok` only means the
/// platform accepted the send call.
pub trait MessageTransport: Send + Sync {
    fn send_text(&self, recipient: &str, body: &str) -> Result<(), TransportError>;
}

/// Text sent to every contact. Built at send time and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub body: String,
}

impl AlertMessage {
    pub fn compose(map_link_base: &str, at: Coordinates) -> Self {
        Self {
            body: format!(
                "Accident detected! Location: {}{},{}",
                map_link_base, at.latitude, at.longitude
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub location: Option<Coordinates>,
    /// Every recipient a send was attempted for, in order
    pub attempted: Vec<String>,
    /// Recipients whose send call raised synchronously
    pub failed: Vec<String>,
}

/// How one run of the alert pathway ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertOutcome {
    Sent(DispatchReport),
    LocationUnavailable,
}

pub struct AlertDispatcher {
    transport: Arc<dyn MessageTransport>,
    map_link_base: String,
}

impl AlertDispatcher {
    pub fn new(transport: Arc<dyn MessageTransport>, map_link_base: impl Into<String>) -> Self {
        Self {
            transport,
            map_link_base: map_link_base.into(),
        }
    }

    /// Send the alert to each recipient independently. A failure for one
    /// recipient does not stop the others.
    pub fn send(&self, location: Coordinates, recipients: &[String]) -> DispatchReport {
        let message = AlertMessage::compose(&self.map_link_base, location);
        let mut report = DispatchReport {
            location: Some(location),
            ..Default::default()
        };

        for recipient in recipients {
            report.attempted.push(recipient.clone());
            match self.transport.send_text(recipient, &message.body) {
                Ok(()) => log::info!("Alert sent to {}", recipient),
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed.push(recipient.clone());
                }
            }
        }

        report
    }
}

/// Location lookup followed by dispatch. Without a fix nothing is sent.
pub async fn run_alert(
    location: Arc<dyn LocationProvider>,
    dispatcher: Arc<AlertDispatcher>,
    recipients: Vec<String>,
) -> AlertOutcome {
    match location.last_known().await {
        Some(at) => AlertOutcome::Sent(dispatcher.send(at, &recipients)),
        None => {
            log::warn!("No last known location, alert aborted");
            AlertOutcome::LocationUnavailable
        }
    }
}
