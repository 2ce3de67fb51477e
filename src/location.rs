use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Platform location service.
///
/// `last_known` resolves to the most recently cached fix, or `None` when the
/// platform has none. Implementations must not retry or fall back.
pub trait LocationProvider: Send + Sync {
    fn last_known(&self) -> BoxFuture<'_, Option<Coordinates>>;
}
