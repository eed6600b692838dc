//! audioqa - run an audio quality test description

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

use audioqa::adb::AdbBridge;
use audioqa::audio::{list_input_devices, list_output_devices, CpalLocalAudio, SharedLocalAudio};
use audioqa::model::parse_test_description_xml;
use audioqa::report::{archive_dir, LOG_FILE};
use audioqa::{Environment, Settings};

#[derive(Parser)]
#[command(name = "audioqa")]
#[command(about = "Run an audio quality test description against the host and a device")]
#[command(version)]
struct Cli {
    /// Log level: 0=trace, 1=debug, 2=info, 3=warn, 4=error
    #[arg(short = 'l', long = "log-level", default_value = "2",
          value_parser = clap::value_parser!(u8).range(0..=4))]
    log_level: u8,

    /// Device serial passed to adb
    #[arg(short, long, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List host audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Test description: a <case> or a <batch> of included cases
    #[arg(required_unless_present = "list_devices")]
    test_xml: Option<PathBuf>,
}

fn level_for(log_level: u8) -> Level {
    match log_level {
        0 => Level::TRACE,
        1 => Level::DEBUG,
        2 => Level::INFO,
        3 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Log to stderr, and to `<dir>/log.txt` when a report directory is given
fn setup_logging(log_level: u8, report_dir: Option<&Path>) -> Result<()> {
    let level = level_for(log_level);
    match report_dir {
        Some(dir) => {
            let file = File::create(dir.join(LOG_FILE))
                .with_context(|| format!("Failed to create log file in {:?}", dir))?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
    }
    Ok(())
}

fn list_devices() {
    println!("Output devices:");
    for device in list_output_devices() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  {}{}", device.name, marker);
    }
    println!("Input devices:");
    for device in list_input_devices() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  {}{}", device.name, marker);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).map_err(anyhow::Error::msg)?,
        None => Settings::default(),
    };
    if cli.serial.is_some() {
        settings.serial = cli.serial.clone();
    }
    settings.validate().map_err(anyhow::Error::msg)?;
    Ok(settings)
}

/// `<report_root>/<YYYY_MM_DD_HH_MM_SS>`
fn create_report_dir(root: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string();
    let dir = root.join(stamp);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create report directory {:?}", dir))?;
    Ok(dir)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        setup_logging(cli.log_level, None)?;
        list_devices();
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    let report_dir = create_report_dir(&settings.report_root)?;
    setup_logging(cli.log_level, Some(&report_dir))?;
    info!("Reports go to {:?}", report_dir);

    let Some(test_xml) = cli.test_xml.as_deref() else {
        bail!("No test description given");
    };
    let Some(mut model) = parse_test_description_xml(test_xml) else {
        bail!("Failed to load test description {:?}", test_xml);
    };

    if settings.forward_port {
        let adb = AdbBridge::new(settings.adb_path.clone(), settings.serial.clone());
        if !adb.forward(settings.remote_port) {
            warn!("Continuing without port forward; device steps may fail");
        }
    }

    let local: SharedLocalAudio = Arc::new(CpalLocalAudio::new(
        settings.playback_device.clone(),
        settings.recording_device.clone(),
    ));
    let base_dir = test_xml.parent().map(Path::to_path_buf).unwrap_or_default();
    let env = Environment::new(settings, local, report_dir.clone()).with_base_dir(base_dir);

    let result = model.run(&env);
    info!("Run finished with {}", result);

    {
        let report = env.report();
        report
            .write_xml(&report_dir)
            .context("Failed to write report")?;
        info!(
            "{} passed, {} failed",
            report.pass_count(),
            report.fail_count()
        );
    }

    drop(model);
    drop(env);
    archive_dir(&report_dir).context("Failed to archive report directory")?;
    Ok(())
}
