//! Character screen used by the detectors and the mode controller
//!
//! The device shows a 20x4 grid of character cells. [`Screen`] implements
//! alerts, centering and formatted output on top of any [`CellWriter`], which
//! is the only part that touches the panel.

use core::fmt;

/// Characters per row
pub const COLUMNS: u8 = 20;
/// Number of rows
pub const ROWS: u8 = 4;

/// Custom symbols the panel can render in a single cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Glyph {
    Block,
    Tick,
    HeartSmall,
    HeartLarge,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Content of one cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Char(char),
    Glyph(Glyph),
}

/// Panel driver writing single cells
pub trait CellWriter {
    type Error;

    /// Draw `cell` at the given position. Positions are always inside the grid.
    fn write_cell(&mut self, column: u8, row: u8, cell: Cell) -> Result<(), Self::Error>;
}

/// Character screen with alert handling.
///
/// Drawing is best effort: writer errors are logged and dropped.
pub struct Screen<W> {
    writer: W,
    alert_visible: bool,
}

impl<W: CellWriter> Screen<W> {
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            alert_visible: false,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// `false` while an alert covers the screen
    pub fn can_draw(&self) -> bool {
        !self.alert_visible
    }

    /// Blank every cell and dismiss any alert
    pub fn clear(&mut self) {
        for row in 0..ROWS {
            for column in 0..COLUMNS {
                self.put(column, row, Cell::Char(' '));
            }
        }
        self.alert_visible = false;
    }

    /// Draw a boxed alert with a centered title and optional subtitle.
    ///
    /// Refused while another alert is showing. Returns whether it was drawn.
    pub fn draw_alert(&mut self, title: &str, subtitle: Option<&str>) -> bool {
        if !self.can_draw() {
            warn!("alert requested while another one is visible");
            return false;
        }

        let last_col = COLUMNS - 1;
        let last_row = ROWS - 1;
        for row in 0..ROWS {
            for column in 0..COLUMNS {
                let cell = match (column, row) {
                    (0, 0) => Cell::Glyph(Glyph::TopLeft),
                    (c, 0) if c == last_col => Cell::Glyph(Glyph::TopRight),
                    (0, r) if r == last_row => Cell::Glyph(Glyph::BottomLeft),
                    (c, r) if c == last_col && r == last_row => Cell::Glyph(Glyph::BottomRight),
                    (_, r) if r == 0 || r == last_row => Cell::Char('-'),
                    (c, _) if c == 0 || c == last_col => Cell::Char('|'),
                    _ => Cell::Char(' '),
                };
                self.put(column, row, cell);
            }
        }

        self.draw_centered_text(title, 1, 1);
        if let Some(subtitle) = subtitle {
            self.draw_centered_text(subtitle, 2, 1);
        }

        self.alert_visible = true;
        true
    }

    /// Write `text` centered between `padding` cells on either side.
    /// Text too long to center starts right after the padding.
    pub fn draw_centered_text(&mut self, text: &str, row: u8, padding: u8) {
        let len = text.chars().count();
        let room = COLUMNS.saturating_sub(padding * 2) as usize;
        let start = if len <= room {
            (room - len) as u8 / 2 + padding
        } else {
            padding
        };
        self.write_str(start, row, text);
    }

    /// Write `text` starting at the given cell, clipped at the right edge
    pub fn write_str(&mut self, column: u8, row: u8, text: &str) {
        for (i, ch) in text.chars().enumerate() {
            let column = column as usize + i;
            if column >= COLUMNS as usize {
                break;
            }
            self.put(column as u8, row, Cell::Char(ch));
        }
    }

    pub fn write_glyph(&mut self, column: u8, row: u8, glyph: Glyph) {
        self.put(column, row, Cell::Glyph(glyph));
    }

    /// Format into a line buffer, then write it like [`Self::write_str`]
    pub fn write_fmt(&mut self, column: u8, row: u8, args: fmt::Arguments) {
        let mut buf = [0u8; 2 * COLUMNS as usize];
        match format_no_std::show(&mut buf, args) {
            Ok(text) => self.write_str(column, row, text),
            Err(_) => warn!("line too long for row {}", row),
        }
    }

    fn put(&mut self, column: u8, row: u8, cell: Cell) {
        if column >= COLUMNS || row >= ROWS {
            return;
        }
        if self.writer.write_cell(column, row, cell).is_err() {
            warn!("display write failed at {},{}", column, row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Grid;

    #[test]
    fn alert_blocks_drawing_until_cleared() {
        let mut screen = Screen::new(Grid::new());
        assert!(screen.can_draw());

        assert!(screen.draw_alert("Heartbeat", None));
        assert!(!screen.can_draw());
        assert!(!screen.draw_alert("Glucose", None));
        assert_eq!(screen.writer().row(1), "|    Heartbeat     |");

        screen.clear();
        assert!(screen.can_draw());
        assert_eq!(screen.writer().row(1), " ".repeat(20));
    }

    #[test]
    fn alert_box_has_corners_and_subtitle() {
        let mut screen = Screen::new(Grid::new());
        screen.draw_alert("User Inactivity", Some("Return to auto"));

        let grid = screen.writer();
        assert_eq!(grid.row(0), "+------------------+");
        assert_eq!(grid.row(2), "|  Return to auto  |");
        assert_eq!(grid.row(3), "+------------------+");
    }

    #[test]
    fn centered_text_respects_padding() {
        let mut screen = Screen::new(Grid::new());
        screen.draw_centered_text("abcd", 0, 0);
        screen.draw_centered_text("this text is far too long", 1, 2);

        assert_eq!(screen.writer().row(0), "        abcd        ");
        assert_eq!(screen.writer().row(1), "  this text is far t");
    }

    #[test]
    fn formatted_write_is_clipped() {
        let mut screen = Screen::new(Grid::new());
        screen.write_fmt(15, 2, format_args!("{}BPM", 123));
        assert_eq!(screen.writer().row(2), "               123BP");
    }

    #[test]
    fn long_text_stops_at_right_edge() {
        let mut screen = Screen::new(Grid::new());
        let text = format!("x{}", "y".repeat(299));
        screen.write_str(0, 0, &text);
        assert_eq!(screen.writer().row(0), format!("x{}", "y".repeat(19)));

        screen.write_str(19, 1, &text);
        assert_eq!(screen.writer().row(1), format!("{}x", " ".repeat(19)));
    }
}
