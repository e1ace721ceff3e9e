use std::time::Duration;

use crate::config::PanelGeometry;
use crate::error::{DisplayError, FailureLog};
use crate::labels::Localizer;
use crate::rank::RankedDetections;

use super::{draw_frame, DisplayComposer, Font, PixelPanel, StatusMessages, TextOp};

/// Fixed geometry of the pixel panel layout.
///
/// The FPS readout sits in the top-right corner; detections list downward
/// from `list_top`, the first in the large font. A row is drawn only while
/// its top edge does not exceed `height - bottom_margin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    pub width: u32,
    pub height: u32,
    pub font_large: u32,
    pub font_small: u32,
    pub max_labels: usize,
    pub row_gap: u32,
    pub list_top: u32,
    pub bottom_margin: u32,
    pub fps_origin: (i32, i32),
    pub placeholder_origin: (i32, i32),
    pub starting_origin: (i32, i32),
    pub stopped_origin: (i32, i32),
}

impl PixelLayout {
    pub fn new(geometry: PanelGeometry, max_labels: usize) -> Self {
        let width = geometry.width as i32;
        let height = geometry.height as i32;
        Self {
            width: geometry.width,
            height: geometry.height,
            font_large: geometry.font_large,
            font_small: geometry.font_small,
            max_labels,
            row_gap: 2,
            list_top: 16,
            bottom_margin: 12,
            fps_origin: ((width - 48).max(0), 0),
            placeholder_origin: (20.min(width - 1), (height / 2 - 4).max(0)),
            starting_origin: (10.min(width - 1), (height / 2 - 12).max(0)),
            stopped_origin: (30.min(width - 1), (height / 2 - 7).max(0)),
        }
    }

    fn font_height(&self, font: Font) -> u32 {
        match font {
            Font::Large => self.font_large,
            Font::Small => self.font_small,
        }
    }
}

pub struct PixelComposer {
    layout: PixelLayout,
    localizer: Localizer,
    messages: StatusMessages,
    stopped_hold: Duration,
    panel: Option<Box<dyn PixelPanel>>,
    failures: FailureLog,
}

impl PixelComposer {
    pub fn new(
        layout: PixelLayout,
        localizer: Localizer,
        stopped_hold: Duration,
        panel: Option<Box<dyn PixelPanel>>,
    ) -> Self {
        Self {
            layout,
            localizer,
            messages: StatusMessages::pixel(localizer.lang()),
            stopped_hold,
            panel,
            failures: FailureLog::default(),
        }
    }

    /// Primitives for one frame, in draw order.
    pub fn frame_ops(&self, ranked: &RankedDetections, fps: f32) -> Vec<TextOp> {
        let layout = &self.layout;
        let mut ops = vec![TextOp {
            x: layout.fps_origin.0,
            y: layout.fps_origin.1,
            font: Font::Small,
            text: format!("FPS:{:.1}", fps),
        }];

        if ranked.is_empty() {
            ops.push(TextOp {
                x: layout.placeholder_origin.0,
                y: layout.placeholder_origin.1,
                font: Font::Large,
                text: self.messages.empty.to_string(),
            });
            return ops;
        }

        let limit = layout.height.saturating_sub(layout.bottom_margin);
        let mut y = layout.list_top;
        for (i, detection) in ranked.iter().take(layout.max_labels).enumerate() {
            if y > limit {
                break;
            }
            let font = if i == 0 { Font::Large } else { Font::Small };
            ops.push(TextOp {
                x: 0,
                y: y as i32,
                font,
                text: format!(
                    "{}.{} {}%",
                    i + 1,
                    self.localizer.localize(&detection.class_name),
                    detection.confidence_percent()
                ),
            });
            y += layout.font_height(font) + layout.row_gap;
        }
        ops
    }

    /// Draw one frame; errors are returned to the caller.
    pub fn try_compose(&mut self, ranked: &RankedDetections, fps: f32) -> Result<(), DisplayError> {
        let ops = self.frame_ops(ranked, fps);
        self.draw(&ops)
    }

    fn draw(&mut self, ops: &[TextOp]) -> Result<(), DisplayError> {
        let Some(panel) = self.panel.as_mut() else {
            return Ok(());
        };
        draw_frame(panel.as_mut(), |canvas| {
            for op in ops {
                canvas.text(op.x, op.y, op.text.as_str(), op.font)?;
            }
            Ok(())
        })
    }

    fn message(&mut self, origin: (i32, i32), text: &'static str) -> Result<(), DisplayError> {
        self.draw(&[TextOp {
            x: origin.0,
            y: origin.1,
            font: Font::Large,
            text: text.to_string(),
        }])
    }
}

impl DisplayComposer for PixelComposer {
    fn max_labels(&self) -> usize {
        self.layout.max_labels
    }

    fn is_attached(&self) -> bool {
        self.panel.is_some()
    }

    fn show_starting(&mut self) {
        let origin = self.layout.starting_origin;
        if let Err(err) = self.message(origin, self.messages.starting) {
            log::warn!("OLED starting message failed: {} ({})", err, err.hint());
        }
    }

    fn compose(&mut self, ranked: &RankedDetections, fps: f32) {
        match self.try_compose(ranked, fps) {
            Ok(()) => self.failures.recovered("OLED refresh"),
            Err(err) => self.failures.record("OLED refresh", &err, err.hint()),
        }
    }

    fn show_stopped(&mut self) {
        if self.panel.is_none() {
            return;
        }
        let origin = self.layout.stopped_origin;
        if let Err(err) = self.message(origin, self.messages.stopped) {
            log::error!("OLED stop message failed: {} ({})", err, err.hint());
        } else if !self.stopped_hold.is_zero() {
            std::thread::sleep(self.stopped_hold);
        }
        if let Some(panel) = self.panel.as_mut() {
            match panel.clear() {
                Ok(()) => log::info!("OLED cleared"),
                Err(err) => log::error!("OLED clear failed: {} ({})", err, err.hint()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::display::MemoryPanel;
    use crate::labels::LabelLang;
    use crate::rank::DetectionRanker;

    fn geometry() -> PanelGeometry {
        PanelGeometry {
            width: 128,
            height: 64,
            font_large: 18,
            font_small: 14,
        }
    }

    fn ranked(entries: &[(&str, f32)], max: usize) -> RankedDetections {
        let detections = entries
            .iter()
            .map(|(name, conf)| Detection::new(0, *name, *conf, BoundingBox::default()))
            .collect();
        DetectionRanker::new(max).rank(detections)
    }

    fn composer(geometry: PanelGeometry, lang: LabelLang) -> (PixelComposer, crate::display::MemoryPanelHandle) {
        let panel = MemoryPanel::new(geometry.width, geometry.height);
        let handle = panel.handle();
        let composer = PixelComposer::new(
            PixelLayout::new(geometry, 3),
            Localizer::new(lang),
            Duration::ZERO,
            Some(Box::new(panel)),
        );
        (composer, handle)
    }

    #[test]
    fn default_layout_matches_reference_positions() {
        let layout = PixelLayout::new(geometry(), 3);
        assert_eq!(layout.fps_origin, (80, 0));
        assert_eq!(layout.placeholder_origin, (20, 28));
        assert_eq!(layout.starting_origin, (10, 20));
        assert_eq!(layout.stopped_origin, (30, 25));
    }

    #[test]
    fn lists_three_entries_with_large_first_row() {
        let (composer, _) = composer(geometry(), LabelLang::Ja);
        let ops = composer.frame_ops(
            &ranked(&[("person", 0.92), ("car", 0.81), ("dog", 0.40)], 3),
            12.34,
        );
        assert_eq!(ops[0].text, "FPS:12.3");
        assert_eq!(ops[0].font, Font::Small);
        let rows: Vec<(i32, Font, &str)> =
            ops[1..].iter().map(|op| (op.y, op.font, op.text.as_str())).collect();
        assert_eq!(
            rows,
            vec![
                (16, Font::Large, "1.人 92%"),
                (36, Font::Small, "2.車 81%"),
                (52, Font::Small, "3.犬 40%"),
            ]
        );
    }

    #[test]
    fn rows_past_the_margin_are_dropped() {
        let tall = PanelGeometry {
            font_large: 24,
            font_small: 20,
            ..geometry()
        };
        let (composer, _) = composer(tall, LabelLang::En);
        let ops = composer.frame_ops(
            &ranked(&[("person", 0.9), ("car", 0.8), ("dog", 0.7)], 3),
            0.0,
        );
        // 16 -> 42 -> 64 (> 52): third row omitted entirely.
        let texts: Vec<&str> = ops[1..].iter().map(|op| op.text.as_str()).collect();
        assert_eq!(texts, vec!["1.Person 90%", "2.Car 80%"]);
    }

    #[test]
    fn empty_set_renders_placeholder() {
        let (mut composer, handle) = composer(geometry(), LabelLang::En);
        composer.compose(&RankedDetections::default(), 0.0);
        let visible = handle.visible();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].text, "FPS:0.0");
        assert_eq!(
            visible[1],
            TextOp {
                x: 20,
                y: 28,
                font: Font::Large,
                text: "No detections".into()
            }
        );
    }

    #[test]
    fn failing_panel_is_logged_not_propagated() {
        let (mut composer, handle) = composer(geometry(), LabelLang::Ja);
        handle.fail_refreshes(2);
        composer.compose(&RankedDetections::default(), 0.0);
        composer.compose(&RankedDetections::default(), 0.0);
        assert_eq!(handle.refreshes(), 0);
        composer.compose(&RankedDetections::default(), 0.0);
        assert_eq!(handle.refreshes(), 1);
    }

    #[test]
    fn detached_composer_is_a_no_op() {
        let mut composer = PixelComposer::new(
            PixelLayout::new(geometry(), 3),
            Localizer::new(LabelLang::Ja),
            Duration::ZERO,
            None,
        );
        assert!(!composer.is_attached());
        composer.show_starting();
        composer.compose(&RankedDetections::default(), 1.0);
        composer.show_stopped();
        assert!(composer.try_compose(&RankedDetections::default(), 1.0).is_ok());
    }

    #[test]
    fn stop_shows_message_then_clears() {
        let (mut composer, handle) = composer(geometry(), LabelLang::Ja);
        composer.show_stopped();
        let frames = handle.frames();
        assert_eq!(frames.last().unwrap()[0].text, "停止");
        assert_eq!(handle.clears(), 1);
        assert!(handle.visible().is_empty());
    }
}
