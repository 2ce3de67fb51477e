use crate::service::ServiceHandle;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::Command;
use tokio::time::{interval, sleep, Duration};

/// One tri-axial accelerometer reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub timestamp: f64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn magnitude(&self) -> f64 {
        Vector3::new(self.x, self.y, self.z).norm()
    }
}

/// Where the simulator gets its samples from
#[derive(Debug, Clone)]
pub enum SampleFeed {
    /// Synthetic riding motion, with an optional impact spike `crash_at` seconds in
    Mock { crash_at: Option<f64> },
    /// `termux-sensor` on an Android phone, mock data when unavailable
    Termux,
    /// Previously recorded samples, paced by their timestamps
    Replay(Vec<MotionSample>),
}

/// Android's SENSOR_DELAY_NORMAL is roughly 5 Hz
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(200);

pub async fn accel_loop(feed: SampleFeed, handle: ServiceHandle) {
    match feed {
        SampleFeed::Replay(samples) => replay_loop(samples, handle).await,
        SampleFeed::Mock { crash_at } => {
            let mut mock = MockMotion::new(SAMPLE_PERIOD.as_secs_f64(), crash_at);
            live_loop(handle, move || mock.next_sample()).await
        }
        SampleFeed::Termux => {
            let mut mock = MockMotion::new(SAMPLE_PERIOD.as_secs_f64(), None);
            live_loop(handle, move || read_accelerometer().unwrap_or_else(|| mock.next_sample()))
                .await
        }
    }
}

async fn live_loop<F>(handle: ServiceHandle, mut next: F)
where
    F: FnMut() -> MotionSample,
{
    let mut ticker = interval(SAMPLE_PERIOD);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;
        if !push(&handle, next(), &mut sample_count) {
            break;
        }
    }
}

async fn replay_loop(samples: Vec<MotionSample>, handle: ServiceHandle) {
    let mut sample_count = 0u64;
    let mut previous: Option<f64> = None;

    for sample in samples {
        if let Some(prev) = previous {
            let gap = (sample.timestamp - prev).clamp(0.0, 1.0);
            sleep(Duration::from_secs_f64(gap)).await;
        }
        previous = Some(sample.timestamp);

        if !push(&handle, sample, &mut sample_count) {
            return;
        }
    }
    log::info!("[accel] Replay finished after {} samples", sample_count);
}

/// Returns false once the service has gone away
fn push(handle: &ServiceHandle, sample: MotionSample, sample_count: &mut u64) -> bool {
    match handle.try_push_sample(sample) {
        Ok(true) => {
            *sample_count += 1;
            if *sample_count % 100 == 0 {
                log::debug!("[accel] {} samples", sample_count);
            }
            true
        }
        // Channel full, drop this sample
        Ok(false) => true,
        Err(_) => {
            log::info!("[accel] Service stopped after {} samples", sample_count);
            false
        }
    }
}

/// Synthetic motion: gravity on z plus a little road vibration
pub struct MockMotion {
    tick: u64,
    period_secs: f64,
    crash_at: Option<f64>,
}

impl MockMotion {
    /// Impact spike length in seconds
    const SPIKE_SECS: f64 = 0.6;

    pub fn new(period_secs: f64, crash_at: Option<f64>) -> Self {
        Self {
            tick: 0,
            period_secs,
            crash_at,
        }
    }

    pub fn next_sample(&mut self) -> MotionSample {
        use std::f64::consts::PI;
        let t = self.tick as f64 * self.period_secs;
        self.tick += 1;

        let in_spike = self
            .crash_at
            .map(|at| t >= at && t < at + Self::SPIKE_SECS)
            .unwrap_or(false);

        if in_spike {
            return MotionSample::new(18.0, 22.0, 9.81, current_timestamp());
        }

        MotionSample::new(
            (t * 2.0 * PI).sin() * 0.5,
            (t * 2.0 * PI).cos() * 0.3,
            9.81 + (t * PI).sin() * 0.1,
            current_timestamp(),
        )
    }
}

fn read_accelerometer() -> Option<MotionSample> {
    let output = Command::new("termux-sensor")
        .arg("-n")
        .arg("1")
        .arg("-s")
        .arg("accelerometer")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_termux_output(&String::from_utf8_lossy(&output.stdout))
}

/// termux-sensor prints `{"<sensor name>": {"values": [x, y, z]}}`
fn parse_termux_output(output: &str) -> Option<MotionSample> {
    let json: Value = serde_json::from_str(output.trim()).ok()?;
    let values = json
        .as_object()?
        .values()
        .find_map(|sensor| sensor.get("values"))?
        .as_array()?;

    if values.len() < 3 {
        return None;
    }
    Some(MotionSample::new(
        values[0].as_f64()?,
        values[1].as_f64()?,
        values[2].as_f64()?,
        current_timestamp(),
    ))
}

#[derive(Deserialize)]
struct LoggedReading {
    accel: Option<MotionSample>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Recording {
    /// Session log with a `readings` array, accel entries optional
    Log { readings: Vec<LoggedReading> },
    Samples(Vec<MotionSample>),
}

/// Load recorded samples from `.json` or `.json.gz`
pub fn load_recording(path: &Path) -> Result<Vec<MotionSample>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader: Box<dyn Read> = if path.extension().map_or(false, |ext| ext == "gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .with_context(|| format!("read {}", path.display()))?;
    parse_recording(&text).with_context(|| format!("parse {}", path.display()))
}

fn parse_recording(text: &str) -> Result<Vec<MotionSample>> {
    let samples = match serde_json::from_str::<Recording>(text)? {
        Recording::Log { readings } => readings.into_iter().filter_map(|r| r.accel).collect(),
        Recording::Samples(samples) => samples,
    };
    Ok(samples)
}

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
