//! Display composition and sinks.
//!
//! Two output surfaces are supported:
//! - a pixel panel (128x64 OLED class), drawn through a scoped [`Canvas`]
//!   that reaches the panel only when the whole frame has been drawn
//! - a character display (16x2 LCD class), written row by row after a clear
//!
//! Sinks: `i2c` drives the real hardware (feature: display-i2c), `console`
//! mirrors to stderr, `memory` keeps recent frames for inspection.
//!
//! Composers never propagate sink failures. A missing sink turns every call
//! into a no-op; a failing refresh is logged and retried on the next frame.

mod character;
mod console;
mod i2c;
mod memory;
mod pixel;

pub use character::CharComposer;
pub use console::{ConsoleCharDisplay, ConsolePanel};
pub use memory::{MemoryCharDisplay, MemoryCharHandle, MemoryPanel, MemoryPanelHandle};
pub use pixel::{PixelComposer, PixelLayout};

use crate::config::{DisplayBackend, DisplayKind, DisplaySettings};
use crate::error::DisplayError;
use crate::labels::{LabelLang, Localizer};
use crate::rank::RankedDetections;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Font {
    Large,
    Small,
}

/// One text primitive on a pixel panel; `(x, y)` is the top-left corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextOp {
    pub x: i32,
    pub y: i32,
    pub font: Font,
    pub text: String,
}

/// Pixel panel driver boundary.
pub trait PixelPanel: Send {
    /// Width and height in pixels.
    fn size(&self) -> (u32, u32);

    /// Replace the visible frame with `ops` in a single refresh.
    fn present(&mut self, ops: &[TextOp]) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;
}

/// Character display driver boundary.
pub trait CharDisplay: Send {
    /// Columns and rows.
    fn geometry(&self) -> (usize, usize);

    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Write `text` starting at `(row, col)`. Text must fit in the row.
    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError>;

    /// Called once a frame's rows are written.
    fn flush(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// An opened display, tagged by surface type.
pub enum DisplaySink {
    Pixel(Box<dyn PixelPanel>),
    Character(Box<dyn CharDisplay>),
}

impl DisplaySink {
    fn surface(&self) -> &'static str {
        match self {
            DisplaySink::Pixel(_) => "pixel panel",
            DisplaySink::Character(_) => "character display",
        }
    }
}

/// Off-screen frame under construction.
///
/// Primitives accumulate here and reach the panel in one `present` call on
/// commit. A canvas dropped without commit (error or panic mid-draw) is
/// discarded, so a half-drawn frame is never shown.
pub struct Canvas<'a> {
    panel: &'a mut dyn PixelPanel,
    width: u32,
    height: u32,
    ops: Vec<TextOp>,
    committed: bool,
}

impl<'a> Canvas<'a> {
    fn new(panel: &'a mut dyn PixelPanel) -> Self {
        let (width, height) = panel.size();
        Self {
            panel,
            width,
            height,
            ops: Vec::new(),
            committed: false,
        }
    }

    /// Queue a text primitive. The origin must lie on the panel.
    pub fn text(
        &mut self,
        x: i32,
        y: i32,
        text: impl Into<String>,
        font: Font,
    ) -> Result<(), DisplayError> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Err(DisplayError::Draw(format!(
                "text origin ({}, {}) outside {}x{} panel",
                x, y, self.width, self.height
            )));
        }
        self.ops.push(TextOp {
            x,
            y,
            font,
            text: text.into(),
        });
        Ok(())
    }

    fn commit(mut self) -> Result<(), DisplayError> {
        self.committed = true;
        let ops = std::mem::take(&mut self.ops);
        self.panel.present(&ops)
    }
}

impl Drop for Canvas<'_> {
    fn drop(&mut self) {
        if !self.committed {
            log::debug!("discarded unfinished frame ({} primitives)", self.ops.len());
        }
    }
}

/// Draw one frame atomically: the panel is refreshed only if `draw` succeeds.
pub fn draw_frame<F>(panel: &mut dyn PixelPanel, draw: F) -> Result<(), DisplayError>
where
    F: FnOnce(&mut Canvas<'_>) -> Result<(), DisplayError>,
{
    let mut canvas = Canvas::new(panel);
    draw(&mut canvas)?;
    canvas.commit()
}

/// Per-frame output contract shared by both surfaces.
pub trait DisplayComposer: Send {
    /// Entries the surface can show per frame.
    fn max_labels(&self) -> usize;

    /// False when running without a sink.
    fn is_attached(&self) -> bool;

    fn show_starting(&mut self);

    fn compose(&mut self, ranked: &RankedDetections, fps: f32);

    /// Best-effort "stopped" message, held for the configured time, then
    /// a final clear. The clear is attempted even if the message failed.
    fn show_stopped(&mut self);
}

/// Fixed status strings for one surface and language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusMessages {
    pub starting: &'static str,
    pub empty: &'static str,
    pub stopped: &'static str,
}

impl StatusMessages {
    pub fn pixel(lang: LabelLang) -> Self {
        match lang {
            LabelLang::Ja => Self {
                starting: "起動中...",
                empty: "検出なし",
                stopped: "停止",
            },
            LabelLang::Ascii | LabelLang::En => Self {
                starting: "Starting...",
                empty: "No detections",
                stopped: "Stopped",
            },
        }
    }

    pub fn character() -> Self {
        Self {
            starting: "Starting...",
            empty: "No objects",
            stopped: "Stopped",
        }
    }
}

/// Open the configured sink.
pub fn open_sink(settings: &DisplaySettings) -> Result<DisplaySink, DisplayError> {
    let sink = match (settings.backend, settings.kind) {
        (DisplayBackend::None, kind) => {
            return Err(DisplayError::Unavailable(format!(
                "no display backend configured for the {:?} on i2c-{} at 0x{:02X}",
                kind,
                settings.i2c_bus,
                settings.address()
            )))
        }
        (DisplayBackend::I2c, _) => i2c::open(settings)?,
        (DisplayBackend::Console, DisplayKind::Oled) => DisplaySink::Pixel(Box::new(
            ConsolePanel::new(settings.panel.width, settings.panel.height),
        )),
        (DisplayBackend::Console, DisplayKind::Lcd) => DisplaySink::Character(Box::new(
            ConsoleCharDisplay::new(settings.lcd.cols, settings.lcd.rows),
        )),
        (DisplayBackend::Memory, DisplayKind::Oled) => DisplaySink::Pixel(Box::new(
            MemoryPanel::new(settings.panel.width, settings.panel.height),
        )),
        (DisplayBackend::Memory, DisplayKind::Lcd) => DisplaySink::Character(Box::new(
            MemoryCharDisplay::new(settings.lcd.cols, settings.lcd.rows),
        )),
    };
    log::info!(
        "{:?} display ready ({:?} sink, i2c-{} 0x{:02X})",
        settings.kind,
        settings.backend,
        settings.i2c_bus,
        settings.address()
    );
    Ok(sink)
}

/// Build the composer for the configured surface around an optional sink.
///
/// A sink of the wrong surface type is treated as absent.
pub fn build_composer(
    settings: &DisplaySettings,
    sink: Option<DisplaySink>,
) -> Box<dyn DisplayComposer> {
    let localizer = Localizer::new(settings.label_lang());
    match settings.kind {
        DisplayKind::Oled => {
            let panel = match sink {
                Some(DisplaySink::Pixel(panel)) => Some(panel),
                Some(other) => {
                    log::error!(
                        "OLED layout cannot drive a {}; continuing without display",
                        other.surface()
                    );
                    None
                }
                None => None,
            };
            let layout = PixelLayout::new(settings.panel, settings.max_labels());
            Box::new(PixelComposer::new(
                layout,
                localizer,
                settings.stopped_hold,
                panel,
            ))
        }
        DisplayKind::Lcd => {
            let lcd = match sink {
                Some(DisplaySink::Character(lcd)) => Some(lcd),
                Some(other) => {
                    log::error!(
                        "LCD layout cannot drive a {}; continuing without display",
                        other.surface()
                    );
                    None
                }
                None => None,
            };
            Box::new(CharComposer::new(
                settings.lcd,
                settings.max_labels(),
                localizer,
                settings.stopped_hold,
                lcd,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    #[test]
    fn canvas_reaches_panel_only_on_success() {
        let mut panel = MemoryPanel::new(128, 64);
        let handle = panel.handle();

        let failed = draw_frame(&mut panel, |canvas| {
            canvas.text(0, 0, "half", Font::Small)?;
            Err(DisplayError::Draw("font missing".into()))
        });
        assert!(failed.is_err());
        assert_eq!(handle.refreshes(), 0);
        assert!(handle.visible().is_empty());

        draw_frame(&mut panel, |canvas| {
            canvas.text(0, 0, "a", Font::Small)?;
            canvas.text(0, 20, "b", Font::Large)
        })
        .unwrap();
        assert_eq!(handle.refreshes(), 1);
        assert_eq!(handle.visible().len(), 2);
    }

    #[test]
    fn canvas_rejects_off_panel_origin() {
        let mut panel = MemoryPanel::new(128, 64);
        let handle = panel.handle();
        let result = draw_frame(&mut panel, |canvas| canvas.text(0, 64, "x", Font::Small));
        assert!(matches!(result, Err(DisplayError::Draw(_))));
        assert_eq!(handle.refreshes(), 0);
    }

    #[test]
    fn none_backend_fails_to_open() {
        let mut cfg = DetectorConfig::default();
        cfg.display.backend = DisplayBackend::None;
        let err = open_sink(&cfg.display).err().expect("no sink");
        assert!(matches!(err, DisplayError::Unavailable(_)));
        assert!(err.to_string().contains("0x3C"));
    }

    #[test]
    fn mismatched_sink_is_treated_as_absent() {
        let mut cfg = DetectorConfig::default();
        cfg.display.kind = DisplayKind::Lcd;
        let sink = DisplaySink::Pixel(Box::new(MemoryPanel::new(128, 64)));
        let composer = build_composer(&cfg.display, Some(sink));
        assert!(!composer.is_attached());
        assert_eq!(composer.max_labels(), 2);
    }
}
