use crate::bridge::{BridgeLocation, BridgeNotices, BridgeRadio, BridgeTransport, Outbox};
use crate::error::{throw_java_exception, BridgeError, JResult};
use crashguard::controller::Platform;
use crashguard::location::Coordinates;
use crashguard::sensors::MotionSample;
use crashguard::service::{self, Command, ServiceHandle};
use crashguard::CrashGuardConfig;
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jint, jstring};
use jni::JNIEnv;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Everything one `nativeStart` brings up
struct Bridge {
    runtime: Runtime,
    handle: ServiceHandle,
    outbox: Arc<Outbox>,
    radio: Arc<BridgeRadio>,
    location: Arc<BridgeLocation>,
}

// Global bridge state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_BRIDGE: Mutex<Option<Arc<Bridge>>> = Mutex::new(None);
}

fn get_bridge() -> JResult<Arc<Bridge>> {
    let guard = GLOBAL_BRIDGE
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global bridge lock".to_string()))?;
    guard.as_ref().map(Arc::clone).ok_or(BridgeError::NotStarted)
}

#[cfg(target_os = "android")]
fn init_logging() {
    let _ = android_log::init("CrashGuard");
}

#[cfg(not(target_os = "android"))]
fn init_logging() {
    let _ = env_logger::try_init();
}

/// Map an `_impl` result onto the 0 / -1 convention
fn status_code(env: &mut JNIEnv, result: JResult<()>) -> jint {
    match result {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

/// Map an `_impl` result onto a Java string, null for `None` or on error
fn string_result(env: &mut JNIEnv, result: JResult<Option<String>>) -> jstring {
    match result {
        Ok(Some(s)) => match env.new_string(&s) {
            Ok(jstr) => jstr.into_raw(),
            Err(_) => {
                let _ = throw_java_exception(
                    env,
                    &BridgeError::JniError("Failed to create Java string".to_string()),
                );
                std::ptr::null_mut()
            }
        },
        Ok(None) => std::ptr::null_mut(),
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            std::ptr::null_mut()
        }
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> JResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(env.get_string(value)?.into()))
}

/// JNI: Boot the runtime and the detection service
/// Parameters: configJson (nullable, defaults apply to missing fields)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_nativeStart(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jint {
    let result = read_string(&mut env, &config_json).and_then(start_impl);
    status_code(&mut env, result)
}

fn start_impl(config_json: Option<String>) -> JResult<()> {
    init_logging();

    let mut guard = GLOBAL_BRIDGE
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global bridge lock".to_string()))?;
    if guard.is_some() {
        return Err(BridgeError::AlreadyStarted);
    }

    let config = match config_json {
        Some(json) => {
            CrashGuardConfig::from_json(&json).map_err(|e| BridgeError::Config(e.to_string()))?
        }
        None => CrashGuardConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("crashguard")
        .enable_all()
        .build()
        .map_err(|e| BridgeError::Internal(format!("Failed to build runtime: {}", e)))?;

    let outbox = Arc::new(Outbox::new());
    let radio = Arc::new(BridgeRadio::new(outbox.clone()));
    let location = Arc::new(BridgeLocation::new(outbox.clone()));
    let platform = Platform {
        radio: radio.clone(),
        location: location.clone(),
        transport: Arc::new(BridgeTransport::new(outbox.clone())),
        notices: Arc::new(BridgeNotices::new(outbox.clone())),
    };

    log::info!(
        "Starting bridge (device {}, threshold {:.1}, window {}s)",
        config.pairing.device_name,
        config.detection.threshold,
        config.detection.confirmation_window_secs
    );
    let (handle, _task) = {
        let _enter = runtime.enter();
        service::spawn(config, platform)
    };

    *guard = Some(Arc::new(Bridge {
        runtime,
        handle,
        outbox,
        radio,
        location,
    }));
    Ok(())
}

/// JNI: Stop the service and tear the runtime down
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_nativeStop(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = stop_impl();
    status_code(&mut env, result)
}

fn stop_impl() -> JResult<()> {
    let bridge = GLOBAL_BRIDGE
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global bridge lock".to_string()))?
        .take()
        .ok_or(BridgeError::NotStarted)?;

    // Release anything parked on a Kotlin answer that will never come
    bridge.radio.close();
    let _ = bridge.location.complete(None);
    let _ = bridge.handle.send_blocking(Command::Shutdown);

    match Arc::try_unwrap(bridge) {
        Ok(bridge) => bridge.runtime.shutdown_timeout(Duration::from_secs(1)),
        // A concurrent JNI call still holds it; the runtime goes with the last clone
        Err(_) => log::warn!("Bridge still in use at stop"),
    }
    log::info!("Bridge stopped");
    Ok(())
}

/// JNI: Save the two emergency contacts (blank allowed)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_saveContacts(
    mut env: JNIEnv,
    _class: JClass,
    contact1: JString,
    contact2: JString,
) -> jint {
    let result = read_string(&mut env, &contact1).and_then(|c1| {
        let c2 = read_string(&mut env, &contact2)?;
        save_contacts_impl(c1.unwrap_or_default(), c2.unwrap_or_default())
    });
    status_code(&mut env, result)
}

fn save_contacts_impl(contact1: String, contact2: String) -> JResult<()> {
    get_bridge()?
        .handle
        .send_blocking(Command::SaveContacts { contact1, contact2 })?;
    Ok(())
}

/// JNI: Look up the bonded bike unit and request a channel to it.
/// Outcome arrives as notices.
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_connectToBike(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = send_command(Command::ConnectToBike);
    status_code(&mut env, result)
}

/// JNI: Arm detection (notice "Connect to bike first." when unpaired)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_startMonitoring(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = send_command(Command::StartMonitoring);
    status_code(&mut env, result)
}

/// JNI: Close the channel to the bike unit
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_disconnect(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = send_command(Command::Disconnect);
    status_code(&mut env, result)
}

fn send_command(command: Command) -> JResult<()> {
    get_bridge()?.handle.send_blocking(command)?;
    Ok(())
}

/// JNI: Push accelerometer sample
/// Parameters: x, y, z (m/s²), timestamp (seconds since epoch)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_pushAccelSample(
    mut env: JNIEnv,
    _class: JClass,
    x: jdouble,
    y: jdouble,
    z: jdouble,
    timestamp: jdouble,
) -> jint {
    let result = push_accel_sample_impl(x, y, z, timestamp);
    status_code(&mut env, result)
}

fn push_accel_sample_impl(x: f64, y: f64, z: f64, timestamp: f64) -> JResult<()> {
    let bridge = get_bridge()?;
    if !bridge
        .handle
        .try_push_sample(MotionSample::new(x, y, z, timestamp))?
    {
        log::debug!("Input queue full, sample at {:.3} dropped", timestamp);
    }
    Ok(())
}

/// JNI: Report adapter presence, enabled flag and bonded device names
/// Parameters: bondedNamesJson is a JSON array of strings
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_updateRadioState(
    mut env: JNIEnv,
    _class: JClass,
    available: jboolean,
    enabled: jboolean,
    bonded_names_json: JString,
) -> jint {
    let result = read_string(&mut env, &bonded_names_json).and_then(|json| {
        update_radio_state_impl(available != 0, enabled != 0, json.as_deref().unwrap_or("[]"))
    });
    status_code(&mut env, result)
}

fn update_radio_state_impl(available: bool, enabled: bool, bonded_names_json: &str) -> JResult<()> {
    let names = parse_peer_names(bonded_names_json)?;
    get_bridge()?.radio.update(available, enabled, names)
}

fn parse_peer_names(json: &str) -> JResult<Vec<String>> {
    serde_json::from_str(json)
        .map_err(|e| BridgeError::InvalidParameters(format!("bonded names: {}", e)))
}

/// JNI: Answer an `open_channel` request
/// Parameters: success, message (nullable failure reason)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_channelResult(
    mut env: JNIEnv,
    _class: JClass,
    success: jboolean,
    message: JString,
) -> jint {
    let result = read_string(&mut env, &message)
        .and_then(|message| channel_result_impl(success != 0, message));
    status_code(&mut env, result)
}

fn channel_result_impl(success: bool, message: Option<String>) -> JResult<()> {
    let result = if success {
        Ok(())
    } else {
        Err(message.unwrap_or_else(|| "socket connect failed".to_string()))
    };
    get_bridge()?.radio.complete_open(result)
}

/// JNI: Answer a `query_location` request
/// Parameters: hasFix, latitude, longitude (ignored without a fix)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_locationResult(
    mut env: JNIEnv,
    _class: JClass,
    has_fix: jboolean,
    latitude: jdouble,
    longitude: jdouble,
) -> jint {
    let result = location_result_impl(has_fix != 0, latitude, longitude);
    status_code(&mut env, result)
}

fn location_result_impl(has_fix: bool, latitude: f64, longitude: f64) -> JResult<()> {
    let fix = has_fix.then(|| Coordinates::new(latitude, longitude));
    get_bridge()?.location.complete(fix)
}

/// JNI: Next platform request as JSON
/// Returns: JSON string, or null when the queue is empty
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_pollRequest(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let result = poll_request_impl();
    string_result(&mut env, result)
}

fn poll_request_impl() -> JResult<Option<String>> {
    match get_bridge()?.outbox.poll() {
        Some(request) => serde_json::to_string(&request)
            .map(Some)
            .map_err(|_| BridgeError::Internal("JSON serialization failed".to_string())),
        None => Ok(None),
    }
}

/// JNI: Current controller state as JSON
/// Returns: JSON string or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_accidentdetection_CrashGuardBridge_getSnapshotJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let result = get_snapshot_json_impl().map(Some);
    string_result(&mut env, result)
}

fn get_snapshot_json_impl() -> JResult<String> {
    let snapshot = get_bridge()?.handle.snapshot_blocking()?;
    serde_json::to_string(&snapshot)
        .map_err(|_| BridgeError::Internal("JSON serialization failed".to_string()))
}
