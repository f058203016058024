//! Minimal raster drawing onto a display buffer
//!
//! Coordinates are signed so shapes may hang off the panel edge; every
//! write goes through [`DisplayBuffer::set_pixel`], which clips.

use crate::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH, LINE_HEIGHT};
use oledcam_video::DisplayBuffer;

pub const BLACK: u16 = 0x0000;
pub const WHITE: u16 = 0xFFFF;
pub const RED: u16 = 0xF800;
pub const GREEN: u16 = 0x07E0;
pub const BLUE: u16 = 0x001F;

/// Drawing surface borrowing a display buffer
pub struct Canvas<'a> {
    buffer: &'a mut DisplayBuffer,
}

impl<'a> Canvas<'a> {
    pub fn new(buffer: &'a mut DisplayBuffer) -> Self {
        Self { buffer }
    }

    pub fn width(&self) -> i32 {
        self.buffer.geometry().width() as i32
    }

    pub fn height(&self) -> i32 {
        self.buffer.geometry().height() as i32
    }

    pub fn clear(&mut self, color: u16) {
        self.buffer.fill(color);
    }

    pub fn pixel(&mut self, x: i32, y: i32, color: u16) {
        if x >= 0 && y >= 0 {
            self.buffer.set_pixel(y as u32, x as u32, color);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u16) {
        for yy in y.max(0)..(y + h).min(self.height()) {
            for xx in x.max(0)..(x + w).min(self.width()) {
                self.pixel(xx, yy, color);
            }
        }
    }

    /// Bresenham line, both endpoints inclusive
    pub fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u16) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;

        loop {
            self.pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Line of the given stroke width, thickened perpendicular to its major axis
    pub fn thick_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, width: i32, color: u16) {
        let horizontal = (x1 - x0).abs() >= (y1 - y0).abs();
        let start = -(width / 2);
        for offset in start..start + width.max(1) {
            if horizontal {
                self.line(x0, y0 + offset, x1, y1 + offset, color);
            } else {
                self.line(x0 + offset, y0, x1 + offset, y1, color);
            }
        }
    }

    /// Midpoint circle outline
    pub fn circle(&mut self, cx: i32, cy: i32, r: i32, color: u16) {
        let (mut x, mut y) = (r, 0);
        let mut err = 1 - r;
        while x >= y {
            for (px, py) in [
                (x, y),
                (y, x),
                (-y, x),
                (-x, y),
                (-x, -y),
                (-y, -x),
                (y, -x),
                (x, -y),
            ] {
                self.pixel(cx + px, cy + py, color);
            }
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    /// Solid triangle by scanline over the bounding box
    pub fn fill_triangle(&mut self, a: (i32, i32), b: (i32, i32), c: (i32, i32), color: u16) {
        let edge = |p: (i32, i32), q: (i32, i32), r: (i32, i32)| {
            (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
        };
        let area = edge(a, b, c);
        if area == 0 {
            self.line(a.0, a.1, b.0, b.1, color);
            self.line(b.0, b.1, c.0, c.1, color);
            return;
        }

        let min_x = a.0.min(b.0).min(c.0);
        let max_x = a.0.max(b.0).max(c.0);
        let min_y = a.1.min(b.1).min(c.1);
        let max_y = a.1.max(b.1).max(c.1);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x, y);
                let (w0, w1, w2) = (edge(b, c, p), edge(c, a, p), edge(a, b, p));
                let inside = if area > 0 {
                    w0 >= 0 && w1 >= 0 && w2 >= 0
                } else {
                    w0 <= 0 && w1 <= 0 && w2 <= 0
                };
                if inside {
                    self.pixel(x, y, color);
                }
            }
        }
    }

    /// Draw text with its top-left corner at (`x`, `y`)
    ///
    /// The background is painted behind each glyph cell. Text that runs off
    /// the right edge wraps back to `x` one line down.
    pub fn text(&mut self, x: i32, y: i32, text: &str, fg: u16, bg: u16) {
        let (mut cx, mut cy) = (x, y);
        for c in text.chars() {
            if cx + GLYPH_WIDTH as i32 > self.width() && cx > x {
                cx = x;
                cy += LINE_HEIGHT as i32;
            }
            if cy >= self.height() {
                break;
            }
            self.glyph(cx, cy, c, fg, bg);
            cx += ADVANCE as i32;
        }
    }

    /// Draw a non-negative integer in decimal
    pub fn number(&mut self, x: i32, y: i32, value: u32, fg: u16, bg: u16) {
        self.text(x, y, &value.to_string(), fg, bg);
    }

    fn glyph(&mut self, x: i32, y: i32, c: char, fg: u16, bg: u16) {
        let bits = font::glyph(c);
        for col in 0..ADVANCE {
            for row in 0..GLYPH_HEIGHT {
                let color = if font::glyph_bit(bits, col, row) { fg } else { bg };
                self.pixel(x + col as i32, y + row as i32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oledcam_video::Geometry;

    fn buffer() -> DisplayBuffer {
        DisplayBuffer::try_new(Geometry::new(16, 16).unwrap()).unwrap()
    }

    fn lit(buf: &DisplayBuffer) -> usize {
        let g = buf.geometry();
        (0..g.height())
            .flat_map(|r| (0..g.width()).map(move |c| (r, c)))
            .filter(|&(r, c)| buf.pixel(r, c) != Some(BLACK))
            .count()
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut buf = buffer();
        Canvas::new(&mut buf).fill_rect(-2, 14, 4, 10, WHITE);
        assert_eq!(lit(&buf), 2 * 2);
        assert_eq!(buf.pixel(15, 1), Some(WHITE));
    }

    #[test]
    fn test_line_endpoints_inclusive() {
        let mut buf = buffer();
        Canvas::new(&mut buf).line(0, 0, 15, 15, RED);
        assert_eq!(lit(&buf), 16);
        assert_eq!(buf.pixel(0, 0), Some(RED));
        assert_eq!(buf.pixel(15, 15), Some(RED));
    }

    #[test]
    fn test_circle_is_symmetric() {
        let mut buf = buffer();
        Canvas::new(&mut buf).circle(8, 8, 5, WHITE);
        assert_eq!(buf.pixel(8, 13), Some(WHITE));
        assert_eq!(buf.pixel(8, 3), Some(WHITE));
        assert_eq!(buf.pixel(3, 8), Some(WHITE));
        assert_eq!(buf.pixel(13, 8), Some(WHITE));
        assert_eq!(buf.pixel(8, 8), Some(BLACK));
    }

    #[test]
    fn test_fill_triangle_covers_vertices() {
        let mut buf = buffer();
        Canvas::new(&mut buf).fill_triangle((0, 0), (10, 0), (0, 10), GREEN);
        assert_eq!(buf.pixel(0, 0), Some(GREEN));
        assert_eq!(buf.pixel(0, 10), Some(GREEN));
        assert_eq!(buf.pixel(10, 0), Some(GREEN));
        assert_eq!(buf.pixel(10, 10), Some(BLACK));
    }

    #[test]
    fn test_text_paints_glyph_cells() {
        let mut buf = buffer();
        Canvas::new(&mut buf).text(0, 0, "|", WHITE, BLUE);
        // middle column lit, first column background
        assert_eq!(buf.pixel(0, 2), Some(WHITE));
        assert_eq!(buf.pixel(0, 0), Some(BLUE));
        // spacing column painted too
        assert_eq!(buf.pixel(0, 5), Some(BLUE));
        assert_eq!(buf.pixel(0, 6), Some(BLACK));
    }

    #[test]
    fn test_text_wraps_at_right_edge() {
        let mut buf = buffer();
        // third glyph would start at x=12 and not fit in 16 px
        Canvas::new(&mut buf).text(0, 0, "|||", WHITE, BLACK);
        assert_eq!(buf.pixel(0, 8), Some(WHITE));
        assert_eq!(buf.pixel(0, 14), Some(BLACK));
        assert_eq!(buf.pixel(LINE_HEIGHT, 2), Some(WHITE));
    }
}
