//! In-memory sinks. Each hands out a cloneable handle so tests (and
//! headless runs) can inspect what would have been shown.
//!
//! Only the most recent refreshes are retained; counters keep
//! the totals.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DisplayError;

use super::{CharDisplay, PixelPanel, TextOp};

/// Refreshes (panel) or flushes (character display) kept for inspection.
pub(crate) const HISTORY_LIMIT: usize = 64;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn push_bounded<T>(history: &mut VecDeque<T>, entry: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(entry);
}

#[derive(Debug, Default)]
struct PanelState {
    frames: VecDeque<Vec<TextOp>>,
    refreshes: usize,
    visible: Vec<TextOp>,
    clears: usize,
    fail_refreshes: usize,
}

pub struct MemoryPanel {
    width: u32,
    height: u32,
    state: Arc<Mutex<PanelState>>,
}

#[derive(Clone)]
pub struct MemoryPanelHandle {
    state: Arc<Mutex<PanelState>>,
}

impl MemoryPanel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(PanelState::default())),
        }
    }

    pub fn handle(&self) -> MemoryPanelHandle {
        MemoryPanelHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl PixelPanel for MemoryPanel {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self, ops: &[TextOp]) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        if state.fail_refreshes > 0 {
            state.fail_refreshes -= 1;
            return Err(DisplayError::Draw("injected refresh failure".into()));
        }
        state.visible = ops.to_vec();
        state.refreshes += 1;
        push_bounded(&mut state.frames, ops.to_vec());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        state.visible.clear();
        state.clears += 1;
        Ok(())
    }
}

impl MemoryPanelHandle {
    /// Completed refreshes.
    pub fn refreshes(&self) -> usize {
        lock(&self.state).refreshes
    }

    pub fn visible(&self) -> Vec<TextOp> {
        lock(&self.state).visible.clone()
    }

    /// Retained frames, oldest first.
    pub fn frames(&self) -> Vec<Vec<TextOp>> {
        lock(&self.state).frames.iter().cloned().collect()
    }

    pub fn clears(&self) -> usize {
        lock(&self.state).clears
    }

    /// Make the next `count` refreshes fail.
    pub fn fail_refreshes(&self, count: usize) {
        lock(&self.state).fail_refreshes = count;
    }
}

#[derive(Debug)]
struct CharState {
    grid: Vec<Vec<char>>,
    writes: usize,
    clears: usize,
    fail_writes: usize,
    flushes: usize,
    history: VecDeque<Vec<String>>,
}

pub struct MemoryCharDisplay {
    cols: usize,
    rows: usize,
    state: Arc<Mutex<CharState>>,
}

#[derive(Clone)]
pub struct MemoryCharHandle {
    state: Arc<Mutex<CharState>>,
}

impl MemoryCharDisplay {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            state: Arc::new(Mutex::new(CharState {
                grid: vec![vec![' '; cols]; rows],
                writes: 0,
                clears: 0,
                fail_writes: 0,
                flushes: 0,
                history: VecDeque::new(),
            })),
        }
    }

    pub fn handle(&self) -> MemoryCharHandle {
        MemoryCharHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl CharDisplay for MemoryCharDisplay {
    fn geometry(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        for row in state.grid.iter_mut() {
            row.fill(' ');
        }
        state.clears += 1;
        Ok(())
    }

    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(DisplayError::Draw("injected write failure".into()));
        }
        let len = text.chars().count();
        if row >= self.rows || col + len > self.cols {
            return Err(DisplayError::Draw(format!(
                "{} chars at ({}, {}) overflow {}x{} display",
                len, row, col, self.cols, self.rows
            )));
        }
        for (offset, ch) in text.chars().enumerate() {
            state.grid[row][col + offset] = ch;
        }
        state.writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        let snapshot = trimmed_rows(&state.grid);
        state.flushes += 1;
        push_bounded(&mut state.history, snapshot);
        Ok(())
    }
}

fn trimmed_rows(grid: &[Vec<char>]) -> Vec<String> {
    grid.iter()
        .map(|row| row.iter().collect::<String>().trim_end().to_string())
        .collect()
}

impl MemoryCharHandle {
    /// Current rows with trailing blanks trimmed.
    pub fn rows(&self) -> Vec<String> {
        trimmed_rows(&lock(&self.state).grid)
    }

    /// Rows as of each retained flush, oldest first.
    pub fn history(&self) -> Vec<Vec<String>> {
        lock(&self.state).history.iter().cloned().collect()
    }

    pub fn flushes(&self) -> usize {
        lock(&self.state).flushes
    }

    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }

    pub fn clears(&self) -> usize {
        lock(&self.state).clears
    }

    /// Make the next `count` writes fail.
    pub fn fail_writes(&self, count: usize) {
        lock(&self.state).fail_writes = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Font;

    #[test]
    fn char_display_rejects_overflowing_writes() {
        let mut lcd = MemoryCharDisplay::new(16, 2);
        let handle = lcd.handle();
        assert!(lcd.write_at(0, 10, "1234567").is_err());
        assert!(lcd.write_at(2, 0, "x").is_err());
        lcd.write_at(1, 4, "abc").unwrap();
        assert_eq!(handle.rows(), vec![String::new(), "    abc".to_string()]);
        assert_eq!(handle.writes(), 1);
    }

    #[test]
    fn panel_history_is_bounded() {
        let mut panel = MemoryPanel::new(128, 64);
        let handle = panel.handle();
        for i in 0..HISTORY_LIMIT + 10 {
            let op = TextOp {
                x: 0,
                y: 0,
                font: Font::Small,
                text: i.to_string(),
            };
            panel.present(&[op]).unwrap();
        }
        let frames = handle.frames();
        assert_eq!(frames.len(), HISTORY_LIMIT);
        assert_eq!(frames[0][0].text, "10");
        assert_eq!(handle.refreshes(), HISTORY_LIMIT + 10);
        assert_eq!(handle.visible()[0].text, (HISTORY_LIMIT + 9).to_string());
    }

    #[test]
    fn char_history_is_bounded() {
        let mut lcd = MemoryCharDisplay::new(16, 2);
        let handle = lcd.handle();
        for i in 0..HISTORY_LIMIT * 3 {
            lcd.clear().unwrap();
            lcd.write_at(0, 0, &i.to_string()).unwrap();
            lcd.flush().unwrap();
        }
        let history = handle.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0][0], (HISTORY_LIMIT * 2).to_string());
        assert_eq!(handle.flushes(), HISTORY_LIMIT * 3);
    }
}
