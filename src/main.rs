use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use crashguard::controller::{Phase, Platform};
use crashguard::pairing::SessionState;
use crashguard::sensors::{self, SampleFeed};
use crashguard::service::{self, Command, ServiceHandle};
use crashguard::sim::{ConsoleNotices, FixedLocation, RecordingTransport, SimulatedRadio};
use crashguard::status::LiveStatus;
use crashguard::CrashGuardConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "crashguard")]
#[command(about = "Ride crash detection: pair with the bike unit, watch for impacts, text contacts", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C, or until a replay ends)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// First emergency contact
    #[arg(long)]
    contact1: Option<String>,

    /// Second emergency contact
    #[arg(long)]
    contact2: Option<String>,

    /// Bonded name of the bike unit
    #[arg(long)]
    device_name: Option<String>,

    /// Confirmation window override in seconds
    #[arg(long)]
    window: Option<u64>,

    /// Sample source
    #[arg(long, value_enum, default_value = "mock")]
    source: Source,

    /// Recorded samples for `--source replay` (.json or .json.gz)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Inject an impact spike this many seconds in (mock source)
    #[arg(long)]
    crash_at: Option<f64>,

    /// Simulated last known latitude
    #[arg(long, default_value = "37.7749", allow_hyphen_values = true)]
    lat: f64,

    /// Simulated last known longitude
    #[arg(long, default_value = "-122.4194", allow_hyphen_values = true)]
    lon: f64,

    /// Simulate a phone without a location fix
    #[arg(long)]
    no_fix: bool,

    /// Make SMS sends to this recipient fail (repeatable)
    #[arg(long = "fail-sms", value_name = "RECIPIENT")]
    fail_sms: Vec<String>,

    /// Simulate Bluetooth switched off
    #[arg(long)]
    radio_off: bool,

    /// Simulate a phone without Bluetooth
    #[arg(long)]
    no_radio: bool,

    /// Write live status JSON here every 2 seconds
    #[arg(long)]
    status_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Mock,
    Termux,
    Replay,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let feed = build_feed(&args)?;

    println!("[{}] CrashGuard starting", ts_now());
    println!("  Device: {}", config.pairing.device_name);
    println!("  Threshold: {:.1}", config.detection.threshold);
    println!("  Confirmation window: {}s", config.detection.confirmation_window_secs);
    println!("  Source: {:?}", args.source);

    let radio = if args.no_radio {
        SimulatedRadio::unavailable()
    } else {
        SimulatedRadio::with_peers(&[config.pairing.device_name.as_str()])
    };
    radio.set_enabled(!args.radio_off);
    let location = if args.no_fix {
        FixedLocation::none()
    } else {
        FixedLocation::at(args.lat, args.lon)
    };
    let transport = Arc::new(RecordingTransport::new());
    for recipient in &args.fail_sms {
        transport.fail_for(recipient);
    }

    let platform = Platform {
        radio: Arc::new(radio),
        location: Arc::new(location),
        transport: transport.clone(),
        notices: Arc::new(ConsoleNotices),
    };
    let window = config.confirmation_window();
    let (handle, service_task) = service::spawn(config, platform);

    if args.contact1.is_some() || args.contact2.is_some() {
        handle
            .send(Command::SaveContacts {
                contact1: args.contact1.clone().unwrap_or_default(),
                contact2: args.contact2.clone().unwrap_or_default(),
            })
            .await?;
    }

    handle.send(Command::ConnectToBike).await?;
    wait_for_pairing(&handle).await?;
    handle.send(Command::StartMonitoring).await?;

    let start = Instant::now();
    let feed_task = tokio::spawn(sensors::accel_loop(feed, handle.clone()));
    let mut status_tick = interval(Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
            _ = status_tick.tick() => {
                write_status(&handle, &args, start).await?;

                if args.duration > 0 && start.elapsed() >= Duration::from_secs(args.duration) {
                    println!("[{}] Duration reached, stopping...", ts_now());
                    break;
                }
                if feed_task.is_finished() && settled(&handle).await? {
                    println!("[{}] Replay complete, stopping...", ts_now());
                    break;
                }
            }
        }
    }

    feed_task.abort();
    write_status(&handle, &args, start).await?;
    let snapshot = handle.snapshot().await?;
    handle.send(Command::Shutdown).await?;
    service_task.await.context("service task")?;

    println!("\n=== Final Stats ===");
    println!("Samples processed: {}", snapshot.samples_seen);
    println!("Breaches: {}", snapshot.breaches);
    println!("Alerts sent: {}", snapshot.alerts_sent);
    println!("Alerts aborted (no fix): {}", snapshot.alerts_aborted);
    if snapshot.phase == Phase::Armed {
        println!(
            "Stopped with a breach pending ({:.0}s of {}s window left)",
            snapshot.confirmation_remaining_secs.unwrap_or(0.0),
            window.as_secs()
        );
    }
    for (to, body) in transport.sent() {
        println!("SMS -> {}: {}", to, body);
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<CrashGuardConfig> {
    let mut config = match &args.config {
        Some(path) => CrashGuardConfig::load(path)?,
        None => CrashGuardConfig::default(),
    };
    if let Some(name) = &args.device_name {
        config.pairing.device_name = name.clone();
    }
    if let Some(window) = args.window {
        config.detection.confirmation_window_secs = window;
    }
    config.validate()?;
    Ok(config)
}

fn build_feed(args: &Args) -> Result<SampleFeed> {
    Ok(match args.source {
        Source::Mock => SampleFeed::Mock {
            crash_at: args.crash_at,
        },
        Source::Termux => SampleFeed::Termux,
        Source::Replay => {
            let Some(path) = &args.replay else {
                bail!("--source replay needs --replay <file>");
            };
            let samples = sensors::load_recording(path)?;
            println!("[{}] Loaded {} samples from {}", ts_now(), samples.len(), path.display());
            SampleFeed::Replay(samples)
        }
    })
}

/// Block until the channel-open attempt resolves, either way
async fn wait_for_pairing(handle: &ServiceHandle) -> Result<()> {
    loop {
        let snapshot = handle.snapshot().await?;
        if !snapshot.connecting {
            if snapshot.session == SessionState::Disconnected {
                bail!("pairing failed, see notices above");
            }
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }
}

/// Nothing pending and no alert in flight
async fn settled(handle: &ServiceHandle) -> Result<bool> {
    let snapshot = handle.snapshot().await?;
    Ok(snapshot.phase != Phase::Armed && !snapshot.alert_in_flight)
}

async fn write_status(handle: &ServiceHandle, args: &Args, start: Instant) -> Result<()> {
    let Some(path) = &args.status_file else {
        return Ok(());
    };
    let snapshot = handle.snapshot().await?;
    let status = LiveStatus::from_snapshot(&snapshot, start.elapsed().as_secs());
    if let Err(e) = status.save(path) {
        log::warn!("Failed to write status to {}: {}", path.display(), e);
    }
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
