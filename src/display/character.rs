use std::time::Duration;

use crate::config::LcdGeometry;
use crate::error::{DisplayError, FailureLog};
use crate::labels::Localizer;
use crate::rank::RankedDetections;

use super::{CharDisplay, DisplayComposer, StatusMessages};

/// Two-row layout for a character display: the top detection on row 0 and
/// the frame rate on row 1.
pub struct CharComposer {
    geometry: LcdGeometry,
    max_labels: usize,
    localizer: Localizer,
    messages: StatusMessages,
    stopped_hold: Duration,
    lcd: Option<Box<dyn CharDisplay>>,
    failures: FailureLog,
}

impl CharComposer {
    pub fn new(
        geometry: LcdGeometry,
        max_labels: usize,
        localizer: Localizer,
        stopped_hold: Duration,
        lcd: Option<Box<dyn CharDisplay>>,
    ) -> Self {
        Self {
            geometry,
            max_labels,
            localizer,
            messages: StatusMessages::character(),
            stopped_hold,
            lcd,
            failures: FailureLog::default(),
        }
    }

    /// Row contents for one frame, each cut to the display width.
    pub fn lines(&self, ranked: &RankedDetections, fps: f32) -> [String; 2] {
        let top = match ranked.top() {
            Some(detection) => format!(
                "{} {}%",
                self.localizer.localize(&detection.class_name),
                detection.confidence_percent()
            ),
            None => self.messages.empty.to_string(),
        };
        [
            fit(&top, self.geometry.cols),
            fit(&format!("FPS: {:.1}", fps), self.geometry.cols),
        ]
    }

    pub fn try_compose(&mut self, ranked: &RankedDetections, fps: f32) -> Result<(), DisplayError> {
        let [top, rate] = self.lines(ranked, fps);
        let rows = self.geometry.rows;
        let Some(lcd) = self.lcd.as_mut() else {
            return Ok(());
        };
        lcd.clear()?;
        lcd.write_at(0, 0, &top)?;
        if rows > 1 {
            lcd.write_at(1, 0, &rate)?;
        }
        lcd.flush()
    }

    fn message(&mut self, text: &str) -> Result<(), DisplayError> {
        let text = fit(text, self.geometry.cols);
        let Some(lcd) = self.lcd.as_mut() else {
            return Ok(());
        };
        lcd.clear()?;
        lcd.write_at(0, 0, &text)?;
        lcd.flush()
    }
}

/// Truncate to `cols` characters.
fn fit(text: &str, cols: usize) -> String {
    text.chars().take(cols).collect()
}

impl DisplayComposer for CharComposer {
    fn max_labels(&self) -> usize {
        self.max_labels
    }

    fn is_attached(&self) -> bool {
        self.lcd.is_some()
    }

    fn show_starting(&mut self) {
        if let Err(err) = self.message(self.messages.starting) {
            log::warn!("LCD starting message failed: {} ({})", err, err.hint());
        }
    }

    fn compose(&mut self, ranked: &RankedDetections, fps: f32) {
        match self.try_compose(ranked, fps) {
            Ok(()) => self.failures.recovered("LCD refresh"),
            Err(err) => self.failures.record("LCD refresh", &err, err.hint()),
        }
    }

    fn show_stopped(&mut self) {
        if self.lcd.is_none() {
            return;
        }
        if let Err(err) = self.message(self.messages.stopped) {
            log::error!("LCD stop message failed: {} ({})", err, err.hint());
        } else if !self.stopped_hold.is_zero() {
            std::thread::sleep(self.stopped_hold);
        }
        if let Some(lcd) = self.lcd.as_mut() {
            match lcd.clear() {
                Ok(()) => log::info!("LCD cleared"),
                Err(err) => log::error!("LCD clear failed: {} ({})", err, err.hint()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::display::{MemoryCharDisplay, MemoryCharHandle};
    use crate::labels::LabelLang;
    use crate::rank::DetectionRanker;

    const LCD: LcdGeometry = LcdGeometry { cols: 16, rows: 2 };

    fn composer(lang: LabelLang) -> (CharComposer, MemoryCharHandle) {
        let lcd = MemoryCharDisplay::new(LCD.cols, LCD.rows);
        let handle = lcd.handle();
        (
            CharComposer::new(
                LCD,
                2,
                Localizer::new(lang),
                Duration::ZERO,
                Some(Box::new(lcd)),
            ),
            handle,
        )
    }

    fn ranked(entries: &[(&str, f32)]) -> RankedDetections {
        let detections = entries
            .iter()
            .map(|(name, conf)| Detection::new(0, *name, *conf, BoundingBox::default()))
            .collect();
        DetectionRanker::new(2).rank(detections)
    }

    #[test]
    fn empty_first_frame_shows_placeholder_and_zero_rate() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        composer.compose(&RankedDetections::default(), 0.0);
        assert_eq!(handle.rows(), vec!["No objects".to_string(), "FPS: 0.0".to_string()]);
    }

    #[test]
    fn top_detection_only_on_first_row() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        composer.compose(&ranked(&[("car", 0.81), ("person", 0.92)]), 14.26);
        assert_eq!(handle.rows(), vec!["Person 92%".to_string(), "FPS: 14.3".to_string()]);
    }

    #[test]
    fn long_labels_are_cut_to_width() {
        let (composer, _) = composer(LabelLang::En);
        let [top, _] = composer.lines(&ranked(&[("extremely long class name", 0.999)]), 0.0);
        assert_eq!(top.chars().count(), 16);
        assert_eq!(top, "Extremely Long C");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let (composer, _) = composer(LabelLang::Ja);
        let [top, _] = composer.lines(&ranked(&[("person", 0.5)]), 0.0);
        assert_eq!(top, "人 50%");
    }

    #[test]
    fn each_refresh_replaces_previous_contents() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        composer.compose(&ranked(&[("refrigerator", 0.77)]), 3.0);
        composer.compose(&RankedDetections::default(), 3.0);
        assert_eq!(handle.rows()[0], "No objects");
        assert_eq!(handle.clears(), 2);
    }

    #[test]
    fn write_failures_do_not_escape() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        handle.fail_writes(1);
        composer.compose(&RankedDetections::default(), 0.0);
        composer.compose(&RankedDetections::default(), 1.0);
        assert_eq!(handle.rows()[1], "FPS: 1.0");
    }

    #[test]
    fn start_and_stop_messages() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        composer.show_starting();
        assert_eq!(handle.rows()[0], "Starting...");
        composer.show_stopped();
        assert_eq!(
            handle.history().last().unwrap(),
            &vec!["Stopped".to_string(), String::new()]
        );
        assert_eq!(handle.rows(), vec![String::new(), String::new()]);
        assert_eq!(handle.clears(), 3);
    }

    #[test]
    fn stop_clears_even_when_the_message_fails() {
        let (mut composer, handle) = composer(LabelLang::Ascii);
        composer.compose(&RankedDetections::default(), 2.0);
        handle.fail_writes(1);
        composer.show_stopped();
        assert_eq!(handle.rows(), vec![String::new(), String::new()]);
        assert_eq!(handle.clears(), 3);
    }
}
