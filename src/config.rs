use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::Thresholds;
use crate::labels::LabelLang;

const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 20;
const DEFAULT_CAMERA_WARMUP_MS: u64 = 2_000;
const DEFAULT_MODEL_NAME: &str = "yolov8n";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_I2C_BUS: u8 = 1;
const DEFAULT_OLED_ADDRESS: u16 = 0x3C;
const DEFAULT_LCD_ADDRESS: u16 = 0x27;
const DEFAULT_OLED_WIDTH: u32 = 128;
const DEFAULT_OLED_HEIGHT: u32 = 64;
const DEFAULT_FONT_LARGE: u32 = 18;
const DEFAULT_FONT_SMALL: u32 = 14;
const DEFAULT_LCD_COLS: usize = 16;
const DEFAULT_LCD_ROWS: usize = 2;
const DEFAULT_OLED_MAX_LABELS: usize = 3;
const DEFAULT_LCD_MAX_LABELS: usize = 2;
const DEFAULT_STOPPED_HOLD_MS: u64 = 1_000;
const DEFAULT_FRAME_RETRY_MS: u64 = 100;
const DEFAULT_LOOP_YIELD_MS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    display: Option<DisplayConfigFile>,
    run: Option<RunConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    kind: Option<CameraKind>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    warmup_ms: Option<u64>,
    drop_rate: Option<f32>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<ModelBackend>,
    name: Option<String>,
    path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    warm_up: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    kind: Option<DisplayKind>,
    backend: Option<DisplayBackend>,
    i2c_bus: Option<u8>,
    address: Option<u16>,
    width: Option<u32>,
    height: Option<u32>,
    font_large: Option<u32>,
    font_small: Option<u32>,
    cols: Option<usize>,
    rows: Option<usize>,
    max_labels: Option<usize>,
    label_lang: Option<LabelLang>,
    stopped_hold_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    max_frames: Option<u64>,
    frame_retry_delay_ms: Option<u64>,
    loop_yield_ms: Option<u64>,
}

/// Camera variant, chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Raspberry Pi CSI camera module; delivers RGB.
    #[serde(alias = "rpi")]
    Csi,
    /// UVC webcam; delivers BGR.
    Usb,
}

impl FromStr for CameraKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rpi" | "csi" => Ok(CameraKind::Csi),
            "usb" => Ok(CameraKind::Usb),
            other => Err(anyhow!("unknown camera type '{}' (expected rpi or usb)", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Stub,
    Tract,
}

impl FromStr for ModelBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(ModelBackend::Stub),
            "tract" => Ok(ModelBackend::Tract),
            other => Err(anyhow!("unknown model backend '{}' (expected stub or tract)", other)),
        }
    }
}

/// Physical output surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    /// 128x64 monochrome pixel panel (SSD1306 class).
    Oled,
    /// 16x2 character display (HD44780 class).
    Lcd,
}

impl FromStr for DisplayKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "oled" => Ok(DisplayKind::Oled),
            "lcd" => Ok(DisplayKind::Lcd),
            other => Err(anyhow!("unknown display '{}' (expected oled or lcd)", other)),
        }
    }
}

/// Where composed frames go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    /// SSD1306 panel or HD44780 LCD on the configured I2C bus.
    I2c,
    /// Mirror every refresh to stderr.
    Console,
    /// Keep refreshes in memory only.
    Memory,
    /// No sink; the pipeline runs without visible output.
    None,
}

impl FromStr for DisplayBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "i2c" => Ok(DisplayBackend::I2c),
            "console" => Ok(DisplayBackend::Console),
            "memory" => Ok(DisplayBackend::Memory),
            "none" => Ok(DisplayBackend::None),
            other => Err(anyhow!(
                "unknown display backend '{}' (expected i2c, console, memory or none)",
                other
            )),
        }
    }
}

impl DisplayBackend {
    /// Real hardware when the I2C drivers are compiled in, stderr otherwise.
    pub fn default_for_build() -> Self {
        if cfg!(feature = "display-i2c") {
            DisplayBackend::I2c
        } else {
            DisplayBackend::Console
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub display: DisplaySettings,
    pub run: RunSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub kind: CameraKind,
    /// Device node, or `stub://name` for the synthetic source.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Settle time after the camera starts streaming.
    pub warmup: Duration,
    pub synthetic: SyntheticSettings,
}

/// Behavior of `stub://` cameras.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSettings {
    /// Fraction of reads that report "no frame".
    pub drop_rate: f32,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: ModelBackend,
    pub name: String,
    pub path: PathBuf,
    /// Square model input side in pixels.
    pub input_size: u32,
    pub thresholds: Thresholds,
    pub warm_up: bool,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub kind: DisplayKind,
    pub backend: DisplayBackend,
    pub i2c_bus: u8,
    address: Option<u16>,
    pub panel: PanelGeometry,
    pub lcd: LcdGeometry,
    max_labels: Option<usize>,
    label_lang: Option<LabelLang>,
    pub stopped_hold: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub width: u32,
    pub height: u32,
    pub font_large: u32,
    pub font_small: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcdGeometry {
    pub cols: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    pub frame_retry_delay: Duration,
    pub loop_yield: Duration,
}

impl DisplaySettings {
    /// I2C address, defaulting per display kind.
    pub fn address(&self) -> u16 {
        self.address.unwrap_or(match self.kind {
            DisplayKind::Oled => DEFAULT_OLED_ADDRESS,
            DisplayKind::Lcd => DEFAULT_LCD_ADDRESS,
        })
    }

    /// Labels shown per frame, defaulting per display kind.
    pub fn max_labels(&self) -> usize {
        self.max_labels.unwrap_or(match self.kind {
            DisplayKind::Oled => DEFAULT_OLED_MAX_LABELS,
            DisplayKind::Lcd => DEFAULT_LCD_MAX_LABELS,
        })
    }

    /// Label table. Character ROMs cannot render kana, so the LCD defaults to ASCII.
    pub fn label_lang(&self) -> LabelLang {
        self.label_lang.unwrap_or(match self.kind {
            DisplayKind::Oled => LabelLang::Ja,
            DisplayKind::Lcd => LabelLang::Ascii,
        })
    }

    pub fn set_address(&mut self, address: u16) {
        self.address = Some(address);
    }

    pub fn set_max_labels(&mut self, max_labels: usize) {
        self.max_labels = Some(max_labels);
    }

    pub fn set_label_lang(&mut self, lang: LabelLang) {
        self.label_lang = Some(lang);
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        // An empty file section resolves to the documented defaults.
        Self::from_file(DetectorConfigFile::default())
    }
}

impl DetectorConfig {
    /// Load from `PANEL_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PANEL_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (JSON, or TOML for `.toml`), apply env overrides, validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => DetectorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let run = file.run.unwrap_or_default();

        Self {
            camera: CameraSettings {
                kind: camera.kind.unwrap_or(CameraKind::Csi),
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                warmup: Duration::from_millis(
                    camera.warmup_ms.unwrap_or(DEFAULT_CAMERA_WARMUP_MS),
                ),
                synthetic: SyntheticSettings {
                    drop_rate: camera.drop_rate.unwrap_or(0.0),
                    seed: camera.seed.unwrap_or(0),
                },
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or(ModelBackend::Tract),
                name: model.name.unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
                thresholds: Thresholds {
                    confidence: model
                        .confidence_threshold
                        .unwrap_or(DEFAULT_CONF_THRESHOLD),
                    iou: model.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                },
                warm_up: model.warm_up.unwrap_or(true),
            },
            display: DisplaySettings {
                kind: display.kind.unwrap_or(DisplayKind::Oled),
                backend: display.backend.unwrap_or_else(DisplayBackend::default_for_build),
                i2c_bus: display.i2c_bus.unwrap_or(DEFAULT_I2C_BUS),
                address: display.address,
                panel: PanelGeometry {
                    width: display.width.unwrap_or(DEFAULT_OLED_WIDTH),
                    height: display.height.unwrap_or(DEFAULT_OLED_HEIGHT),
                    font_large: display.font_large.unwrap_or(DEFAULT_FONT_LARGE),
                    font_small: display.font_small.unwrap_or(DEFAULT_FONT_SMALL),
                },
                lcd: LcdGeometry {
                    cols: display.cols.unwrap_or(DEFAULT_LCD_COLS),
                    rows: display.rows.unwrap_or(DEFAULT_LCD_ROWS),
                },
                max_labels: display.max_labels,
                label_lang: display.label_lang,
                stopped_hold: Duration::from_millis(
                    display.stopped_hold_ms.unwrap_or(DEFAULT_STOPPED_HOLD_MS),
                ),
            },
            run: RunSettings {
                max_frames: run.max_frames,
                frame_retry_delay: Duration::from_millis(
                    run.frame_retry_delay_ms.unwrap_or(DEFAULT_FRAME_RETRY_MS),
                ),
                loop_yield: Duration::from_millis(
                    run.loop_yield_ms.unwrap_or(DEFAULT_LOOP_YIELD_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("PANEL_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(path) = std::env::var("PANEL_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("PANEL_MODEL_BACKEND") {
            self.model.backend = backend.parse()?;
        }
        if let Ok(display) = std::env::var("PANEL_DISPLAY") {
            self.display.kind = display.parse()?;
        }
        if let Ok(lang) = std::env::var("PANEL_LABEL_LANG") {
            self.display.label_lang = Some(lang.parse()?);
        }
        if let Ok(frames) = std::env::var("PANEL_MAX_FRAMES") {
            let frames: u64 = frames
                .parse()
                .map_err(|_| anyhow!("PANEL_MAX_FRAMES must be an integer frame count"))?;
            self.run.max_frames = Some(frames);
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if !(0.0..1.0).contains(&camera.synthetic.drop_rate) {
            return Err(anyhow!("camera drop_rate must be in [0, 1)"));
        }

        let thresholds = self.model.thresholds;
        if !(thresholds.confidence > 0.0 && thresholds.confidence <= 1.0) {
            return Err(anyhow!("confidence threshold must be in (0, 1]"));
        }
        if !(thresholds.iou > 0.0 && thresholds.iou <= 1.0) {
            return Err(anyhow!("IoU threshold must be in (0, 1]"));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(anyhow!("model input_size must be a positive multiple of 32"));
        }

        let display = &self.display;
        if display.max_labels() == 0 {
            return Err(anyhow!("display max_labels must be at least 1"));
        }
        match display.kind {
            DisplayKind::Oled => {
                let panel = display.panel;
                if panel.width == 0 || panel.height == 0 {
                    return Err(anyhow!("panel geometry must be non-zero"));
                }
                if panel.font_large == 0 || panel.font_small == 0 {
                    return Err(anyhow!("font sizes must be non-zero"));
                }
            }
            DisplayKind::Lcd => {
                if display.lcd.cols == 0 || display.lcd.rows < 2 {
                    return Err(anyhow!("character display needs at least 1 column and 2 rows"));
                }
            }
        }
        if display.address() > 0x7F {
            return Err(anyhow!(
                "I2C address 0x{:02X} is outside the 7-bit range",
                display.address()
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_display_kind() {
        let mut cfg = DetectorConfig::default();
        assert_eq!(cfg.display.kind, DisplayKind::Oled);
        assert_eq!(cfg.display.max_labels(), 3);
        assert_eq!(cfg.display.address(), 0x3C);
        assert_eq!(cfg.display.label_lang(), LabelLang::Ja);

        cfg.display.kind = DisplayKind::Lcd;
        assert_eq!(cfg.display.max_labels(), 2);
        assert_eq!(cfg.display.address(), 0x27);
        assert_eq!(cfg.display.label_lang(), LabelLang::Ascii);

        cfg.display.set_max_labels(1);
        assert_eq!(cfg.display.max_labels(), 1);
    }

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = DetectorConfig::default();
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        assert_eq!(cfg.camera.target_fps, 20);
        assert_eq!(cfg.model.thresholds, Thresholds::default());
        assert_eq!(cfg.model.name, "yolov8n");
        assert_eq!(cfg.display.panel.font_large, 18);
        assert_eq!(cfg.display.panel.font_small, 14);
        assert_eq!(cfg.run.frame_retry_delay, Duration::from_millis(100));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        let mut cfg = DetectorConfig::default();
        cfg.model.thresholds.confidence = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.model.thresholds.iou = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.model.input_size = 600;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_address() {
        let mut cfg = DetectorConfig::default();
        cfg.display.set_address(0x80);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_flag_values() {
        assert_eq!("rpi".parse::<CameraKind>().unwrap(), CameraKind::Csi);
        assert_eq!("USB".parse::<CameraKind>().unwrap(), CameraKind::Usb);
        assert_eq!("lcd".parse::<DisplayKind>().unwrap(), DisplayKind::Lcd);
        assert_eq!("none".parse::<DisplayBackend>().unwrap(), DisplayBackend::None);
        assert_eq!("I2C".parse::<DisplayBackend>().unwrap(), DisplayBackend::I2c);
        assert!("hdmi".parse::<DisplayKind>().is_err());
    }
}
