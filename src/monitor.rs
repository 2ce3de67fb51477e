use crate::sensors::MotionSample;
use serde::{Deserialize, Serialize};

/// An impact spike awaiting confirmation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub timestamp: f64,
    pub magnitude: f64,
}

/// Threshold check over the accelerometer stream.
///
/// Holds the accident candidate: once a breach is raised, further samples are
/// ignored until [`MotionMonitor::clear`] is called after the alert completes.
pub struct MotionMonitor {
    threshold: f64,
    pending: Option<Breach>,
}

impl MotionMonitor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pending: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feed one sample. Returns the breach the first time the magnitude exceeds
    /// the threshold while the bike is connected and nothing is pending.
    pub fn observe(&mut self, sample: &MotionSample, connected: bool) -> Option<Breach> {
        if !connected {
            return None;
        }

        let magnitude = sample.magnitude();
        log::debug!(target: "accelerometer", "Acceleration: {:.3}", magnitude);

        if magnitude > self.threshold && self.pending.is_none() {
            let breach = Breach {
                timestamp: sample.timestamp,
                magnitude,
            };
            self.pending = Some(breach);
            return Some(breach);
        }

        None
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<Breach> {
        self.pending
    }

    /// Drop the candidate so the next spike can raise again
    pub fn clear(&mut self) -> Option<Breach> {
        self.pending.take()
    }
}
