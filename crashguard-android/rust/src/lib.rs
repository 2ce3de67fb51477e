// CrashGuard Android JNI Library
// Exposes the Rust detection core to Kotlin via JNI

pub mod android_jni;
pub mod bridge;
pub mod error;

pub use bridge::{BridgeLocation, BridgeNotices, BridgeRadio, BridgeTransport, Outbox, PlatformRequest};
pub use error::{BridgeError, JResult};
