//! Sinks that mirror the display to stderr, for bench runs without the
//! I2C hardware attached.

use crate::error::DisplayError;

use super::{CharDisplay, Font, PixelPanel, TextOp};

pub struct ConsolePanel {
    width: u32,
    height: u32,
    last: Option<Vec<TextOp>>,
}

impl ConsolePanel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            last: None,
        }
    }
}

impl PixelPanel for ConsolePanel {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self, ops: &[TextOp]) -> Result<(), DisplayError> {
        // Frames repeat at camera rate; only print changes.
        if self.last.as_deref() == Some(ops) {
            return Ok(());
        }
        let line = ops
            .iter()
            .map(|op| {
                let marker = match op.font {
                    Font::Large => "L",
                    Font::Small => "s",
                };
                format!("({},{}){} {}", op.x, op.y, marker, op.text)
            })
            .collect::<Vec<_>>()
            .join(" | ");
        eprintln!("[oled {}x{}] {}", self.width, self.height, line);
        self.last = Some(ops.to_vec());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        eprintln!("[oled {}x{}] <clear>", self.width, self.height);
        self.last = None;
        Ok(())
    }
}

pub struct ConsoleCharDisplay {
    cols: usize,
    rows: Vec<String>,
    shown: Vec<String>,
}

impl ConsoleCharDisplay {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows: vec![String::new(); rows],
            shown: Vec::new(),
        }
    }
}

impl CharDisplay for ConsoleCharDisplay {
    fn geometry(&self) -> (usize, usize) {
        (self.cols, self.rows.len())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        for row in self.rows.iter_mut() {
            row.clear();
        }
        Ok(())
    }

    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError> {
        let cols = self.cols;
        let Some(line) = self.rows.get_mut(row) else {
            return Err(DisplayError::Draw(format!("row {} out of range", row)));
        };
        if col + text.chars().count() > cols {
            return Err(DisplayError::Draw(format!(
                "'{}' at column {} overflows {} columns",
                text, col, cols
            )));
        }
        let mut chars: Vec<char> = line.chars().collect();
        if chars.len() < col {
            chars.resize(col, ' ');
        }
        chars.truncate(col);
        chars.extend(text.chars());
        *line = chars.into_iter().collect();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        if self.shown == self.rows {
            return Ok(());
        }
        let body = self
            .rows
            .iter()
            .map(|row| format!("{:<width$}", row, width = self.cols))
            .collect::<Vec<_>>()
            .join("|");
        eprintln!("[lcd] |{}|", body);
        self.shown = self.rows.clone();
        Ok(())
    }
}
