//! Face sprites.
//!
//! A face is 16x16 blocks scaled up with filled rectangles, so a redraw is a few dozen
//! `fill_solid` calls. Frame `n` shows mood `n / 4` (0 = clean air .. 4 = bad air) in variant
//! `n % 4`: looking ahead, left, right, or blinking.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

pub const GRID: u32 = 16;

const BACKGROUND: Rgb565 = Rgb565::BLACK;
const FEATURES: Rgb565 = Rgb565::BLACK;

/// x, y, width, height in grid blocks.
type Block = (i32, i32, u32, u32);

const HEAD: [Block; 2] = [(2, 1, 12, 14), (1, 2, 14, 12)];

const EYES_OPEN: [Block; 2] = [(4, 5, 2, 3), (10, 5, 2, 3)];
const EYES_CLOSED: [Block; 2] = [(4, 7, 2, 1), (10, 7, 2, 1)];

const MOUTHS: [&[Block]; 5] = [
    &[(4, 10, 1, 1), (11, 10, 1, 1), (5, 11, 6, 1)],
    &[(5, 10, 1, 1), (10, 10, 1, 1), (6, 11, 4, 1)],
    &[(5, 11, 6, 1)],
    &[(6, 10, 4, 1), (5, 11, 1, 1), (10, 11, 1, 1)],
    &[(5, 10, 6, 1), (4, 11, 1, 1), (11, 11, 1, 1), (4, 12, 1, 1), (11, 12, 1, 1)],
];

const MOOD_COLORS: [Rgb565; 5] = [
    Rgb565::new(0, 50, 8),
    Rgb565::new(18, 56, 0),
    Rgb565::new(31, 58, 0),
    Rgb565::new(31, 32, 0),
    Rgb565::new(28, 6, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gaze {
    Ahead,
    Left,
    Right,
    Blink,
}

pub fn mood_of(frame: u8) -> usize {
    usize::from(frame / 4).min(MOUTHS.len() - 1)
}

pub fn gaze_of(frame: u8) -> Gaze {
    match frame % 4 {
        0 => Gaze::Ahead,
        1 => Gaze::Left,
        2 => Gaze::Right,
        _ => Gaze::Blink,
    }
}

/// Draws `frame` with its top-left corner at `origin`, each grid block `scale` pixels wide.
pub fn draw_face<D>(target: &mut D, frame: u8, origin: Point, scale: u32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let mood = mood_of(frame);
    let block = |(x, y, w, h): Block| {
        Rectangle::new(
            origin + Point::new(x * scale as i32, y * scale as i32),
            Size::new(w * scale, h * scale),
        )
    };

    target.fill_solid(&block((0, 0, GRID, GRID)), BACKGROUND)?;

    for b in HEAD {
        block(b)
            .into_styled(PrimitiveStyle::with_fill(MOOD_COLORS[mood]))
            .draw(target)?;
    }

    let (eyes, shift) = match gaze_of(frame) {
        Gaze::Ahead => (EYES_OPEN, 0),
        Gaze::Left => (EYES_OPEN, -1),
        Gaze::Right => (EYES_OPEN, 1),
        Gaze::Blink => (EYES_CLOSED, 0),
    };
    for (x, y, w, h) in eyes {
        block((x + shift, y, w, h))
            .into_styled(PrimitiveStyle::with_fill(FEATURES))
            .draw(target)?;
    }

    for &b in MOUTHS[mood] {
        block(b)
            .into_styled(PrimitiveStyle::with_fill(FEATURES))
            .draw(target)?;
    }

    Ok(())
}
