use crashguard::error::ControlError;
use jni::JNIEnv;
use thiserror::Error;

/// Errors surfaced to Kotlin as exceptions
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Bridge not started")]
    NotStarted,

    #[error("Bridge already started")]
    AlreadyStarted,

    #[error("Invalid bridge state: {0}")]
    InvalidState(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, BridgeError>;

impl From<jni::errors::Error> for BridgeError {
    fn from(err: jni::errors::Error) -> Self {
        BridgeError::JniError(err.to_string())
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BridgeError) -> JResult<()> {
    let exception_class = match error {
        BridgeError::NotStarted
        | BridgeError::AlreadyStarted
        | BridgeError::InvalidState(_)
        | BridgeError::Control(_) => "java/lang/IllegalStateException",
        BridgeError::InvalidParameters(_) | BridgeError::Config(_) => {
            "java/lang/IllegalArgumentException"
        }
        BridgeError::JniError(_) | BridgeError::Internal(_) => "java/lang/RuntimeException",
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| BridgeError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}
