//! paneld - camera object detection shown on a small I2C display
//!
//! Loads the model, opens the camera and the display (in that order), then
//! runs the detection loop until Ctrl-C or `--max-frames`. Exits non-zero when
//! the model or camera cannot be initialized, or when the loop fails.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use panel_detector::config::{CameraKind, DetectorConfig};
use panel_detector::ingest::usb_device_path;
use panel_detector::{PipelineDriver, SystemPeripherals};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "paneld",
    about = "Detect objects with YOLO and show them on an OLED or LCD"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, env = "PANEL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera variant (rpi|usb)
    #[arg(long, value_name = "TYPE")]
    camera_type: Option<String>,

    /// USB camera index (/dev/videoN)
    #[arg(long, value_name = "N")]
    device: Option<u32>,

    /// Display layout (oled|lcd)
    #[arg(long, value_name = "KIND")]
    display: Option<String>,

    /// Display sink (i2c|console|memory|none)
    #[arg(long, value_name = "SINK")]
    display_backend: Option<String>,

    /// Inference backend (tract|stub)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// ONNX model path
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Label language (ja|ascii|en)
    #[arg(long, value_name = "LANG")]
    lang: Option<String>,

    /// Stop after this many processed frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = DetectorConfig::load_from(args.config.as_deref())?;
        apply_args(&mut cfg, &args)?;
        cfg.validate()?;
        cfg
    };
    log::info!(
        "panel detector starting ({} -> {:?} display)",
        cfg.camera.kind.label(),
        cfg.display.kind
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let peripherals = SystemPeripherals;
    let mut driver = PipelineDriver::new(cfg);
    {
        let mut stage = ui.stage("Load model");
        if let Err(err) = driver.load_model(&peripherals) {
            stage.failed();
            return Err(err.into());
        }
    }
    {
        let mut stage = ui.stage("Open camera");
        if let Err(err) = driver.open_camera(&peripherals) {
            stage.failed();
            return Err(err.into());
        }
    }
    {
        let mut stage = ui.stage("Open display");
        driver.open_display(&peripherals)?;
        if !driver.display_attached() {
            stage.degraded("running without display");
        }
    }

    let summary = driver.run(&stop)?;
    log::info!("panel detector stopped after {} frames", summary.frames_processed);
    Ok(())
}

fn apply_args(cfg: &mut DetectorConfig, args: &Args) -> Result<()> {
    if let Some(kind) = &args.camera_type {
        cfg.camera.kind = kind.parse()?;
    }
    if let Some(index) = args.device {
        if cfg.camera.kind != CameraKind::Usb {
            log::warn!("--device only applies to USB cameras; ignoring");
        } else {
            cfg.camera.device = usb_device_path(index);
        }
    }
    if let Some(display) = &args.display {
        cfg.display.kind = display.parse()?;
    }
    if let Some(sink) = &args.display_backend {
        cfg.display.backend = sink.parse()?;
    }
    if let Some(backend) = &args.backend {
        cfg.model.backend = backend.parse()?;
    }
    if let Some(model) = &args.model {
        cfg.model.path = model.clone();
    }
    if let Some(lang) = &args.lang {
        cfg.display.set_label_lang(lang.parse()?);
    }
    if let Some(frames) = args.max_frames {
        cfg.run.max_frames = Some(frames);
    }
    Ok(())
}
