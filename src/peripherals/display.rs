//! ST7789 panel driven as a 20x4 character display

use biosense::display::{Cell, CellWriter, Glyph, COLUMNS, ROWS};
use display_interface_spi::SPIInterface;
use embassy_nrf::{
    gpio::{AnyPin, Output},
    spim::{self, Spim},
};
use embassy_time::Delay;
use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Circle, Polyline, PrimitiveStyle, Rectangle, Triangle},
    text::{Baseline, Text},
};
use mipidsi::{models::ST7789, Builder, Orientation};

const LCD_W: u16 = 240;
const LCD_H: u16 = 240;

/// Size of one character cell in pixels
const CELL_W: i32 = LCD_W as i32 / COLUMNS as i32;
const CELL_H: i32 = 30;
/// First pixel row of the grid, centering it vertically
const TOP: i32 = (LCD_H as i32 - CELL_H * ROWS as i32) / 2;

const BACKGROUND_COLOR: Rgb565 = Rgb565::BLACK;
const TEXT_COLOR: Rgb565 = Rgb565::new(0x1d, 0x3b, 0x1d);
const HEART_COLOR: Rgb565 = Rgb565::RED;

#[derive(Debug, defmt::Format)]
pub enum Error {
    /// Panel did not come up
    Init,
    /// SPI transfer failed
    Draw,
}

type Lcd<'a, SPI> =
    mipidsi::Display<SPIInterface<Spim<'a, SPI>, Output<'a, AnyPin>, Output<'a, AnyPin>>, ST7789, Output<'a, AnyPin>>;

pub struct CharacterLcd<'a, SPI>
where
    SPI: spim::Instance,
{
    lcd: Lcd<'a, SPI>,
}

impl<'a, SPI> CharacterLcd<'a, SPI>
where
    SPI: spim::Instance,
{
    /// Reset and configure the panel, then blank it
    pub fn init(
        spim: Spim<'a, SPI>,
        cs_pin: Output<'a, AnyPin>,
        dc_pin: Output<'a, AnyPin>,
        rst_pin: Output<'a, AnyPin>,
    ) -> Result<Self, Error> {
        let lcd = Builder::st7789(SPIInterface::new(spim, dc_pin, cs_pin))
            .with_display_size(LCD_W, LCD_H)
            .with_orientation(Orientation::Portrait(false))
            .init(&mut Delay, Some(rst_pin))
            .map_err(|_| Error::Init)?;

        let mut display = Self { lcd };
        display.lcd.clear(BACKGROUND_COLOR).map_err(|_| Error::Draw)?;
        Ok(display)
    }

    fn draw<D>(&mut self, item: &D) -> Result<(), Error>
    where
        D: Drawable<Color = Rgb565>,
    {
        item.draw(&mut self.lcd).map(|_| ()).map_err(|_| Error::Draw)
    }

    fn draw_glyph(&mut self, glyph: Glyph, area: Rectangle) -> Result<(), Error> {
        let center = area.center();
        let (left, top) = (area.top_left.x, area.top_left.y);
        let (right, bottom) = (left + CELL_W - 1, top + CELL_H - 1);
        let line = PrimitiveStyle::with_stroke(TEXT_COLOR, 2);

        match glyph {
            Glyph::Block => self.draw(&area.offset(-1).into_styled(PrimitiveStyle::with_fill(TEXT_COLOR))),
            Glyph::Tick => {
                let points = [center + Point::new(-4, 1), center + Point::new(-1, 5), center + Point::new(5, -5)];
                self.draw(&Polyline::new(&points).into_styled(line))
            }
            Glyph::HeartSmall => self.draw_heart(center, 2),
            Glyph::HeartLarge => self.draw_heart(center, 3),
            Glyph::TopLeft => self.draw_corner([Point::new(center.x, bottom), center, Point::new(right, center.y)]),
            Glyph::TopRight => self.draw_corner([Point::new(left, center.y), center, Point::new(center.x, bottom)]),
            Glyph::BottomLeft => self.draw_corner([Point::new(center.x, top), center, Point::new(right, center.y)]),
            Glyph::BottomRight => self.draw_corner([Point::new(left, center.y), center, Point::new(center.x, top)]),
        }
    }

    fn draw_corner(&mut self, points: [Point; 3]) -> Result<(), Error> {
        self.draw(&Polyline::new(&points).into_styled(PrimitiveStyle::with_stroke(TEXT_COLOR, 2)))
    }

    /// Two lobes and a point, `r` pixels per lobe radius
    fn draw_heart(&mut self, center: Point, r: i32) -> Result<(), Error> {
        let fill = PrimitiveStyle::with_fill(HEART_COLOR);
        let diameter = 2 * r as u32 + 1;
        self.draw(&Circle::with_center(center + Point::new(-r, -r), diameter).into_styled(fill))?;
        self.draw(&Circle::with_center(center + Point::new(r, -r), diameter).into_styled(fill))?;
        self.draw(
            &Triangle::new(
                center + Point::new(-2 * r, -r / 2),
                center + Point::new(2 * r, -r / 2),
                center + Point::new(0, 2 * r),
            )
            .into_styled(fill),
        )
    }
}

impl<SPI> CellWriter for CharacterLcd<'_, SPI>
where
    SPI: spim::Instance,
{
    type Error = Error;

    fn write_cell(&mut self, column: u8, row: u8, cell: Cell) -> Result<(), Self::Error> {
        let origin = Point::new(column as i32 * CELL_W, TOP + row as i32 * CELL_H);
        let area = Rectangle::new(origin, Size::new(CELL_W as u32, CELL_H as u32));
        self.draw(&area.into_styled(PrimitiveStyle::with_fill(BACKGROUND_COLOR)))?;

        match cell {
            Cell::Char(' ') => Ok(()),
            Cell::Char(ch) => {
                let mut buf = [0u8; 4];
                let text = ch.encode_utf8(&mut buf);
                let style = MonoTextStyle::new(&FONT_10X20, TEXT_COLOR);
                self.draw(&Text::with_baseline(text, origin + Point::new(1, 5), style, Baseline::Top))
            }
            Cell::Glyph(glyph) => self.draw_glyph(glyph, area),
        }
    }
}
