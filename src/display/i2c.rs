//! I2C hardware sinks (feature: display-i2c).
//!
//! - pixel panel: SSD1306 through `ssd1306` + `embedded-graphics`
//! - character display: HD44780 behind a PCF8574 backpack through
//!   `hd44780-driver`
//!
//! Both open `/dev/i2c-{bus}` with `linux-embedded-hal`. The built-in fonts
//! and the LCD character ROM are ASCII; anything else is shown as `?`.

use crate::config::DisplaySettings;
use crate::error::DisplayError;

use super::DisplaySink;

/// DDRAM offsets of each row on an HD44780 (rows 2 and 3 continue rows 0 and 1).
#[cfg_attr(not(feature = "display-i2c"), allow(dead_code))]
fn ddram_address(cols: usize, row: usize, col: usize) -> Option<u8> {
    let base = match row {
        0 => 0x00,
        1 => 0x40,
        2 => cols,
        3 => 0x40 + cols,
        _ => return None,
    };
    u8::try_from(base + col).ok()
}

#[cfg_attr(not(feature = "display-i2c"), allow(dead_code))]
fn ascii_only(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_ascii() && !ch.is_ascii_control() { ch } else { '?' })
        .collect()
}

fn device_address(settings: &DisplaySettings) -> Result<u8, DisplayError> {
    u8::try_from(settings.address())
        .ok()
        .filter(|addr| *addr < 0x80)
        .ok_or_else(|| {
            DisplayError::Unavailable(format!("invalid I2C address 0x{:X}", settings.address()))
        })
}

#[cfg(feature = "display-i2c")]
pub(crate) fn open(settings: &DisplaySettings) -> Result<DisplaySink, DisplayError> {
    use crate::config::DisplayKind;

    let address = device_address(settings)?;
    let path = format!("/dev/i2c-{}", settings.i2c_bus);
    let bus = linux_embedded_hal::I2cdev::new(&path)
        .map_err(|err| DisplayError::Unavailable(format!("open {}: {}", path, err)))?;
    match settings.kind {
        DisplayKind::Oled => Ok(DisplaySink::Pixel(Box::new(hw::Ssd1306Panel::open(
            bus,
            address,
            settings.panel.width,
            settings.panel.height,
        )?))),
        DisplayKind::Lcd => Ok(DisplaySink::Character(Box::new(hw::Hd44780Display::open(
            bus,
            address,
            settings.lcd.cols,
            settings.lcd.rows,
        )?))),
    }
}

#[cfg(not(feature = "display-i2c"))]
pub(crate) fn open(settings: &DisplaySettings) -> Result<DisplaySink, DisplayError> {
    let address = device_address(settings)?;
    Err(DisplayError::Unavailable(format!(
        "I2C display drivers not compiled in (rebuild with --features display-i2c) \
         for the {:?} on i2c-{} at 0x{:02X}",
        settings.kind, settings.i2c_bus, address
    )))
}

#[cfg(feature = "display-i2c")]
mod hw {
    use embedded_graphics::mono_font::ascii::{FONT_6X13, FONT_9X18};
    use embedded_graphics::mono_font::MonoTextStyle;
    use embedded_graphics::pixelcolor::BinaryColor;
    use embedded_graphics::prelude::*;
    use embedded_graphics::text::{Baseline, Text};
    use hd44780_driver::bus::I2CBus;
    use hd44780_driver::{Cursor, CursorBlink, Display, DisplayMode, HD44780};
    use linux_embedded_hal::{Delay, I2cdev};
    use ssd1306::mode::BufferedGraphicsMode;
    use ssd1306::prelude::*;
    use ssd1306::{I2CDisplayInterface, Ssd1306};

    use super::{ascii_only, ddram_address};
    use crate::display::{CharDisplay, Font, PixelPanel, TextOp};
    use crate::error::DisplayError;

    type Panel128x64 =
        Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

    pub(super) struct Ssd1306Panel {
        display: Panel128x64,
    }

    impl Ssd1306Panel {
        pub(super) fn open(
            bus: I2cdev,
            address: u8,
            width: u32,
            height: u32,
        ) -> Result<Self, DisplayError> {
            if (width, height) != (128, 64) {
                return Err(DisplayError::Unavailable(format!(
                    "SSD1306 driver supports 128x64, configured {}x{}",
                    width, height
                )));
            }
            let interface = I2CDisplayInterface::new_custom_address(bus, address);
            let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
                .into_buffered_graphics_mode();
            display.init().map_err(|err| {
                DisplayError::Unavailable(format!("SSD1306 init at 0x{:02X}: {:?}", address, err))
            })?;
            Ok(Self { display })
        }

        fn blank(&mut self) -> Result<(), DisplayError> {
            DrawTarget::clear(&mut self.display, BinaryColor::Off)
                .map_err(|err| DisplayError::Draw(format!("{:?}", err)))
        }

        fn push(&mut self) -> Result<(), DisplayError> {
            self.display
                .flush()
                .map_err(|err| DisplayError::Draw(format!("SSD1306 flush: {:?}", err)))
        }
    }

    impl PixelPanel for Ssd1306Panel {
        fn size(&self) -> (u32, u32) {
            (128, 64)
        }

        fn present(&mut self, ops: &[TextOp]) -> Result<(), DisplayError> {
            self.blank()?;
            for op in ops {
                let font = match op.font {
                    Font::Large => &FONT_9X18,
                    Font::Small => &FONT_6X13,
                };
                let style = MonoTextStyle::new(font, BinaryColor::On);
                let text = ascii_only(&op.text);
                Text::with_baseline(&text, Point::new(op.x, op.y), style, Baseline::Top)
                    .draw(&mut self.display)
                    .map_err(|err| DisplayError::Draw(format!("{:?}", err)))?;
            }
            self.push()
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.blank()?;
            self.push()
        }
    }

    pub(super) struct Hd44780Display {
        lcd: HD44780<I2CBus<I2cdev>>,
        delay: Delay,
        cols: usize,
        rows: usize,
    }

    fn lcd_error(what: &str, err: hd44780_driver::error::Error) -> DisplayError {
        DisplayError::Draw(format!("HD44780 {}: {:?}", what, err))
    }

    impl Hd44780Display {
        pub(super) fn open(
            bus: I2cdev,
            address: u8,
            cols: usize,
            rows: usize,
        ) -> Result<Self, DisplayError> {
            let mut delay = Delay;
            let mut lcd = HD44780::new_i2c(bus, address, &mut delay).map_err(|err| {
                DisplayError::Unavailable(format!("HD44780 init at 0x{:02X}: {:?}", address, err))
            })?;
            lcd.reset(&mut delay).map_err(|err| lcd_error("reset", err))?;
            lcd.set_display_mode(
                DisplayMode {
                    display: Display::On,
                    cursor_visibility: Cursor::Invisible,
                    cursor_blink: CursorBlink::Off,
                },
                &mut delay,
            )
            .map_err(|err| lcd_error("display mode", err))?;
            lcd.clear(&mut delay).map_err(|err| lcd_error("clear", err))?;
            Ok(Self {
                lcd,
                delay,
                cols,
                rows,
            })
        }
    }

    impl CharDisplay for Hd44780Display {
        fn geometry(&self) -> (usize, usize) {
            (self.cols, self.rows)
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.lcd
                .clear(&mut self.delay)
                .map_err(|err| lcd_error("clear", err))
        }

        fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError> {
            let len = text.chars().count();
            if row >= self.rows || col + len > self.cols {
                return Err(DisplayError::Draw(format!(
                    "{} chars at ({}, {}) overflow {}x{} display",
                    len, row, col, self.cols, self.rows
                )));
            }
            let position = ddram_address(self.cols, row, col).ok_or_else(|| {
                DisplayError::Draw(format!("row {} not addressable on HD44780", row))
            })?;
            self.lcd
                .set_cursor_pos(position, &mut self.delay)
                .map_err(|err| lcd_error("cursor", err))?;
            self.lcd
                .write_str(&ascii_only(text), &mut self.delay)
                .map_err(|err| lcd_error("write", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_map_to_ddram_offsets() {
        assert_eq!(ddram_address(16, 0, 0), Some(0x00));
        assert_eq!(ddram_address(16, 1, 3), Some(0x43));
        assert_eq!(ddram_address(20, 2, 0), Some(0x14));
        assert_eq!(ddram_address(20, 3, 1), Some(0x55));
        assert_eq!(ddram_address(16, 4, 0), None);
    }

    #[test]
    fn non_ascii_text_is_replaced() {
        assert_eq!(ascii_only("1.人 92%"), "1.? 92%");
        assert_eq!(ascii_only("FPS: 9.5"), "FPS: 9.5");
    }

    #[cfg(not(feature = "display-i2c"))]
    #[test]
    fn missing_feature_is_reported() {
        let settings = crate::config::DetectorConfig::default().display;
        let err = open(&settings).err().expect("feature disabled");
        assert!(matches!(err, DisplayError::Unavailable(_)));
        assert!(err.to_string().contains("display-i2c"));
        assert!(err.to_string().contains("0x3C"));
    }
}
