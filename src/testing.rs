//! Host doubles for the display, the heartbeat LED and the ADC multiplexer

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::{
    display::{Cell, CellWriter, Glyph, COLUMNS, ROWS},
    sample::Channel,
    sampler::ChannelMux,
};

/// In-memory character grid. Glyphs are shown as ASCII stand-ins.
pub struct Grid {
    cells: [[char; COLUMNS as usize]; ROWS as usize],
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cells: [[' '; COLUMNS as usize]; ROWS as usize],
        }
    }

    pub fn row(&self, row: u8) -> String {
        self.cells[row as usize].iter().collect()
    }

    pub fn cell(&self, column: u8, row: u8) -> char {
        self.cells[row as usize][column as usize]
    }
}

impl CellWriter for Grid {
    type Error = Infallible;

    fn write_cell(&mut self, column: u8, row: u8, cell: Cell) -> Result<(), Self::Error> {
        self.cells[row as usize][column as usize] = match cell {
            Cell::Char(ch) => ch,
            Cell::Glyph(Glyph::Block) => '#',
            Cell::Glyph(Glyph::Tick) => 'v',
            Cell::Glyph(Glyph::HeartSmall) => 'h',
            Cell::Glyph(Glyph::HeartLarge) => 'H',
            Cell::Glyph(_) => '+',
        };
        Ok(())
    }
}

/// Output pin remembering its level
#[derive(Default)]
pub struct Led {
    pub high: bool,
    pub toggles: usize,
}

impl ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            self.toggles += 1;
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            self.toggles += 1;
        }
        self.high = true;
        Ok(())
    }
}

/// Multiplexer that switches instantly
pub struct Mux(pub Channel);

impl ChannelMux for Mux {
    fn configured(&self) -> Channel {
        self.0
    }

    fn select(&mut self, channel: Channel) {
        self.0 = channel;
    }
}
