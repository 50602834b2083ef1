use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::{Baseline, Text};
use heapless::String;

use super::{Display, DisplayError, Field, SPRITE_COUNT, face};

const BACKGROUND: Rgb565 = Rgb565::BLACK;
const FOREGROUND: Rgb565 = Rgb565::WHITE;

const FACE_ORIGIN: Point = Point::new(40, 44);
const FACE_SCALE: u32 = 10;

const TITLE_AT: Point = Point::new(16, 12);
const UNITS_AT: Point = Point::new(136, 10);
const PM25_AREA: Rectangle = Rectangle::new(Point::new(80, 12), Size::new(50, 20));
const HEADER_AREA: Rectangle = Rectangle::new(Point::new(30, 214), Size::new(180, 10));
const COUNTS_AREA: Rectangle = Rectangle::new(Point::new(60, 228), Size::new(120, 60));

/// Everything the panel should show. Flushing diffs this against what was last drawn.
#[derive(Clone, PartialEq, Eq)]
struct Scene {
    pm25: String<8>,
    header: String<32>,
    counts: String<96>,
    sprite: u8,
    visible: bool,
}

impl Scene {
    fn new() -> Self {
        Self {
            pm25: String::new(),
            header: String::new(),
            counts: String::new(),
            sprite: 0,
            visible: true,
        }
    }
}

/// Retained-mode scene on any RGB565 draw target.
///
/// Layout (portrait, 240x320): title and PM2.5 value across the top, the face in the middle,
/// bin counts at the bottom. Hiding blanks the panel; showing again redraws everything.
pub struct SceneDisplay<D> {
    target: D,
    pending: Scene,
    drawn: Option<Scene>,
}

impl<D: DrawTarget<Color = Rgb565>> SceneDisplay<D> {
    pub fn new(target: D) -> Self {
        Self {
            target,
            pending: Scene::new(),
            drawn: None,
        }
    }

    fn redraw_all(&mut self) -> Result<(), D::Error> {
        self.target.clear(BACKGROUND)?;
        if !self.pending.visible {
            return Ok(());
        }

        let large = MonoTextStyle::new(&FONT_10X20, FOREGROUND);
        let small = MonoTextStyle::new(&FONT_6X10, FOREGROUND);
        Text::with_baseline("PM2.5:", TITLE_AT, large, Baseline::Top).draw(&mut self.target)?;
        Text::with_baseline("ug/\nm^3", UNITS_AT, small, Baseline::Top).draw(&mut self.target)?;

        for field in [Field::Pm25Value, Field::CountsHeader, Field::Counts] {
            self.draw_field(field)?;
        }
        face::draw_face(&mut self.target, self.pending.sprite, FACE_ORIGIN, FACE_SCALE)
    }

    fn draw_field(&mut self, field: Field) -> Result<(), D::Error> {
        let (area, text, font) = match field {
            Field::Pm25Value => (PM25_AREA, self.pending.pm25.as_str(), &FONT_10X20),
            Field::CountsHeader => (HEADER_AREA, self.pending.header.as_str(), &FONT_6X10),
            Field::Counts => (COUNTS_AREA, self.pending.counts.as_str(), &FONT_6X10),
        };
        self.target.fill_solid(&area, BACKGROUND)?;
        Text::with_baseline(
            text,
            area.top_left,
            MonoTextStyle::new(font, FOREGROUND),
            Baseline::Top,
        )
        .draw(&mut self.target)?;
        Ok(())
    }

    fn draw_changes(&mut self, drawn: &Scene) -> Result<(), D::Error> {
        if drawn.visible != self.pending.visible {
            return self.redraw_all();
        }
        if !self.pending.visible {
            return Ok(());
        }
        if drawn.pm25 != self.pending.pm25 {
            self.draw_field(Field::Pm25Value)?;
        }
        if drawn.header != self.pending.header {
            self.draw_field(Field::CountsHeader)?;
        }
        if drawn.counts != self.pending.counts {
            self.draw_field(Field::Counts)?;
        }
        if drawn.sprite != self.pending.sprite {
            face::draw_face(&mut self.target, self.pending.sprite, FACE_ORIGIN, FACE_SCALE)?;
        }
        Ok(())
    }
}

impl<D: DrawTarget<Color = Rgb565>> Display for SceneDisplay<D> {
    fn set_field(&mut self, field: Field, text: &str) -> Result<(), DisplayError> {
        let slot = match field {
            Field::Pm25Value => replace(&mut self.pending.pm25, text),
            Field::CountsHeader => replace(&mut self.pending.header, text),
            Field::Counts => replace(&mut self.pending.counts, text),
        };
        slot.map_err(|_| DisplayError::TextOverflow)
    }

    fn set_sprite_index(&mut self, index: u8) -> Result<(), DisplayError> {
        if index >= SPRITE_COUNT {
            return Err(DisplayError::SpriteOutOfRange(index));
        }
        self.pending.sprite = index;
        Ok(())
    }

    fn set_layer_visible(&mut self, visible: bool) {
        self.pending.visible = visible;
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let result = match self.drawn.take() {
            Some(drawn) if drawn == self.pending => {
                self.drawn = Some(drawn);
                return Ok(());
            }
            Some(drawn) => self.draw_changes(&drawn),
            None => self.redraw_all(),
        };
        result.map_err(|_| DisplayError::Bus)?;
        self.drawn = Some(self.pending.clone());
        Ok(())
    }
}

fn replace<const N: usize>(slot: &mut String<N>, text: &str) -> Result<(), ()> {
    let mut next = String::new();
    next.push_str(text)?;
    *slot = next;
    Ok(())
}
