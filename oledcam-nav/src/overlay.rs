//! Navigation overlay: layout pass, icon drawing, and the screen that
//! presents it
//!
//! Layout turns a telemetry snapshot into an ordered list of draw items;
//! rendering replays the list back-to-front onto a cleared buffer.

use crate::canvas::{Canvas, BLACK, RED, WHITE};
use crate::error::NavError;
use crate::record::{Maneuver, RouteFile};
use crate::telemetry::{TelemetryHub, TelemetrySnapshot};
use oledcam_video::{DisplayBuffer, Geometry, SharedSink};

pub const ARRIVED_TEXT: &str = "YOU HAVE ARRIVED!";

/// Icons occupy a square in the band above the street line
pub const ICON_SIZE: i32 = 32;
pub const ICON_TOP: i32 = 4;

/// One draw operation, positioned in panel pixels
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayItem {
    Text {
        x: i32,
        y: i32,
        text: String,
        color: u16,
    },
    Number {
        x: i32,
        y: i32,
        value: u32,
        color: u16,
    },
    Icon {
        x: i32,
        y: i32,
        maneuver: Maneuver,
    },
}

impl OverlayItem {
    fn text(x: i32, y: i32, text: impl Into<String>) -> Self {
        OverlayItem::Text {
            x,
            y,
            text: text.into(),
            color: WHITE,
        }
    }
}

/// Left edge of each maneuver's icon; the shapes differ in width
pub fn icon_x(maneuver: Maneuver) -> i32 {
    match maneuver {
        Maneuver::Left => 25,
        Maneuver::Right => 15,
        Maneuver::Straight => 40,
        Maneuver::UTurn => 20,
        Maneuver::Roundabout => 30,
        Maneuver::Destination => 40,
        Maneuver::Merge => 40,
        Maneuver::Unknown => 30,
    }
}

fn icon_item(snapshot: &TelemetrySnapshot) -> OverlayItem {
    let maneuver = snapshot.route.maneuver().unwrap_or_default();
    let y = if maneuver == Maneuver::Unknown {
        ICON_TOP + 5
    } else {
        ICON_TOP
    };
    OverlayItem::Icon {
        x: icon_x(maneuver),
        y,
        maneuver,
    }
}

/// Build the draw list for one frame
pub fn layout(snapshot: &TelemetrySnapshot) -> Vec<OverlayItem> {
    let route = &snapshot.route;
    let mut items = Vec::with_capacity(8);

    if route.has_arrived() {
        items.push(OverlayItem::text(0, 40, ARRIVED_TEXT));
        items.push(icon_item(snapshot));
        return items;
    }

    items.push(icon_item(snapshot));
    items.push(OverlayItem::text(0, 40, route.street_name.as_str()));
    items.push(OverlayItem::text(0, 115, route.arrival_time.as_str()));
    items.push(OverlayItem::text(70, 50, route.distance.as_str()));

    match snapshot.battery {
        Some(battery) => items.push(OverlayItem::Number {
            x: 0,
            y: 50,
            value: battery.percentage.round() as u32,
            color: if battery.low { RED } else { WHITE },
        }),
        None => items.push(OverlayItem::text(0, 50, "--")),
    }
    items.push(OverlayItem::text(35, 50, "%"));

    items.push(OverlayItem::text(100, 115, route.current_temp.as_str()));
    items.push(OverlayItem::text(55, 115, route.current_weather.as_str()));
    items
}

/// Clear the buffer and draw every item in order
pub fn render(items: &[OverlayItem], buffer: &mut DisplayBuffer) {
    let mut canvas = Canvas::new(buffer);
    canvas.clear(BLACK);
    for item in items {
        match item {
            OverlayItem::Text { x, y, text, color } => canvas.text(*x, *y, text, *color, BLACK),
            OverlayItem::Number { x, y, value, color } => {
                canvas.number(*x, *y, *value, *color, BLACK)
            }
            OverlayItem::Icon { x, y, maneuver } => draw_icon(&mut canvas, *maneuver, *x, *y, WHITE),
        }
    }
}

/// Draw a maneuver icon inside the `ICON_SIZE` square at (`x`, `y`)
pub fn draw_icon(canvas: &mut Canvas<'_>, maneuver: Maneuver, x: i32, y: i32, color: u16) {
    let s = ICON_SIZE;
    let cx = x + s / 2;
    let mid = y + s / 2;
    let bottom = y + s - 1;

    match maneuver {
        Maneuver::Straight => {
            canvas.thick_line(cx, bottom, cx, y + 10, 4, color);
            canvas.fill_triangle((cx - 8, y + 11), (cx + 8, y + 11), (cx, y), color);
        }
        Maneuver::Left => {
            canvas.thick_line(cx + 6, bottom, cx + 6, mid, 4, color);
            canvas.thick_line(cx + 8, mid, x + 10, mid, 4, color);
            canvas.fill_triangle((x, mid), (x + 11, mid - 8), (x + 11, mid + 8), color);
        }
        Maneuver::Right => {
            let right = x + s - 1;
            canvas.thick_line(cx - 6, bottom, cx - 6, mid, 4, color);
            canvas.thick_line(cx - 8, mid, right - 10, mid, 4, color);
            canvas.fill_triangle((right, mid), (right - 11, mid - 8), (right - 11, mid + 8), color);
        }
        Maneuver::UTurn => {
            let up = x + 24;
            let down = x + 8;
            canvas.thick_line(up, bottom, up, y + 6, 4, color);
            canvas.thick_line(up + 1, y + 6, down - 1, y + 6, 4, color);
            canvas.thick_line(down, y + 6, down, bottom - 10, 4, color);
            canvas.fill_triangle((down - 8, bottom - 11), (down + 8, bottom - 11), (down, bottom), color);
        }
        Maneuver::Roundabout => {
            canvas.circle(cx, mid, 8, color);
            canvas.circle(cx, mid, 7, color);
            canvas.thick_line(cx, bottom, cx, mid + 9, 4, color);
            canvas.thick_line(cx + 6, mid - 6, x + s - 6, y + 6, 3, color);
            canvas.fill_triangle((x + s - 1, y), (x + s - 11, y + 2), (x + s - 3, y + 10), color);
        }
        Maneuver::Destination => {
            canvas.thick_line(x + 8, bottom, x + 8, y, 3, color);
            canvas.fill_triangle((x + 10, y), (x + 10, y + 16), (x + 28, y + 8), color);
            canvas.fill_rect(x + 2, bottom - 2, 13, 3, color);
        }
        Maneuver::Merge => {
            canvas.thick_line(cx, bottom, cx, y + 10, 4, color);
            canvas.thick_line(x + 2, bottom, cx, mid, 3, color);
            canvas.fill_triangle((cx - 8, y + 11), (cx + 8, y + 11), (cx, y), color);
        }
        Maneuver::Unknown => {
            canvas.circle(cx, mid, 12, color);
            canvas.text(cx - 2, mid - 3, "?", color, BLACK);
        }
    }
}

/// Navigation mode's output: reads the route file, renders, presents
pub struct NavigationScreen {
    route: RouteFile,
    hub: TelemetryHub,
    sink: SharedSink,
    buffer: DisplayBuffer,
}

impl NavigationScreen {
    pub fn new(
        geometry: Geometry,
        route: RouteFile,
        hub: TelemetryHub,
        sink: SharedSink,
    ) -> Result<Self, NavError> {
        Ok(Self {
            route,
            hub,
            sink,
            buffer: DisplayBuffer::try_new(geometry)?,
        })
    }

    pub fn hub(&self) -> &TelemetryHub {
        &self.hub
    }

    /// Refresh the route, render one overlay frame and present it
    ///
    /// A missing or unreadable route file is not fatal; the last valid
    /// record is drawn instead. Display failures are returned.
    pub fn tick(&mut self) -> Result<(), NavError> {
        match self.route.refresh() {
            Ok(record) => self.hub.publish_route(record),
            Err(e) => {
                log::debug!("{}: {}", self.route.path().display(), e);
                self.hub.publish_route(self.route.last_valid());
            }
        }

        let snapshot = self.hub.snapshot();
        render(&layout(&snapshot), &mut self.buffer);
        self.sink.lock().present(&self.buffer)?;
        Ok(())
    }

    /// Show a one-line status message, e.g. a camera start failure
    pub fn show_message(&mut self, text: &str) -> Result<(), NavError> {
        let mut canvas = Canvas::new(&mut self.buffer);
        canvas.clear(BLACK);
        canvas.text(10, 50, text, RED, BLACK);
        self.sink.lock().present(&self.buffer)?;
        Ok(())
    }

    /// Blank the panel
    pub fn clear(&mut self) -> Result<(), NavError> {
        self.buffer.fill(BLACK);
        self.sink.lock().present(&self.buffer)?;
        Ok(())
    }
}
