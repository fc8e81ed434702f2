//! [`FrameAnnotator`] – draws fused sensor readings onto a captured frame.
//!
//! Ranging returns are projected from polar `(angle, distance)` to pixels
//! around the frame centre; the scanner's zero bearing is rotated by −90° so
//! that "forward" points up.  Two text lines summarise temperature and
//! location.  Annotation is a pure function of its inputs.

use scout_hal::camera::{CameraFrame, Rgb};
use scout_types::{LocationFix, ScanResult, TemperatureReading};

use crate::font::{GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH, glyph};

/// Pixels per millimetre of range.
pub const DEFAULT_SCALE_PX_PER_MM: f32 = 0.1;

const POINT_RADIUS: i64 = 10;
const POINT_COLOR: Rgb = [255, 0, 0];
const TEXT_COLOR: Rgb = [255, 255, 255];
const TEXT_SCALE: i64 = 2;

/// Baseline-left anchors of the two text lines.
const TEMPERATURE_ANCHOR: (i64, i64) = (10, 30);
const LOCATION_ANCHOR: (i64, i64) = (10, 60);

#[derive(Debug, Clone, Copy)]
pub struct FrameAnnotator {
    scale_px_per_mm: f32,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE_PX_PER_MM)
    }
}

impl FrameAnnotator {
    pub fn new(scale_px_per_mm: f32) -> Self {
        Self { scale_px_per_mm }
    }

    /// Pixel positions of every sample that lands inside a
    /// `width × height` frame.  Samples projecting outside are dropped.
    pub fn project_points(&self, width: u32, height: u32, scan: &ScanResult) -> Vec<(i64, i64)> {
        let cx = f64::from(width / 2);
        let cy = f64::from(height / 2);
        let scale = f64::from(self.scale_px_per_mm);
        scan.samples()
            .iter()
            .filter_map(|s| {
                let theta = (f64::from(s.angle_deg) - 90.0).to_radians();
                let r = scale * f64::from(s.distance_mm);
                let x = (cx + r * theta.cos()) as i64;
                let y = (cy + r * theta.sin()) as i64;
                let inside = x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height);
                inside.then_some((x, y))
            })
            .collect()
    }

    /// Draw each in-bounds ranging sample as a filled red disc.
    pub fn project_ranging(&self, mut frame: CameraFrame, scan: &ScanResult) -> CameraFrame {
        for (x, y) in self.project_points(frame.width, frame.height, scan) {
            fill_disc(&mut frame, x, y, POINT_RADIUS, POINT_COLOR);
        }
        frame
    }

    /// Write the temperature and location summary lines.
    pub fn overlay_text(
        &self,
        mut frame: CameraFrame,
        temperature: Option<&TemperatureReading>,
        fix: Option<&LocationFix>,
    ) -> CameraFrame {
        draw_text(&mut frame, TEMPERATURE_ANCHOR, &temperature_line(temperature), TEXT_COLOR);
        draw_text(&mut frame, LOCATION_ANCHOR, &location_line(fix), TEXT_COLOR);
        frame
    }
}

pub fn temperature_line(temperature: Option<&TemperatureReading>) -> String {
    match temperature {
        Some(t) => format!(
            "Ambient Temp: {:.2}C, Object Temp: {:.2}C",
            t.ambient_c, t.object_c
        ),
        None => "Temperature: Unavailable".to_string(),
    }
}

pub fn location_line(fix: Option<&LocationFix>) -> String {
    match fix {
        Some(f) => format!(
            "Lat: {:.6}, Lng: {:.6} ({})",
            f.latitude, f.longitude, f.source
        ),
        None => "Location: Unavailable".to_string(),
    }
}

fn fill_disc(frame: &mut CameraFrame, cx: i64, cy: i64, radius: i64, color: Rgb) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                frame.set_pixel(cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_text(frame: &mut CameraFrame, anchor: (i64, i64), text: &str, color: Rgb) {
    let (mut x, baseline) = anchor;
    let top = baseline - GLYPH_HEIGHT * TEXT_SCALE;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (*bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col * TEXT_SCALE;
                        let py = top + row as i64 * TEXT_SCALE;
                        for sy in 0..TEXT_SCALE {
                            for sx in 0..TEXT_SCALE {
                                frame.set_pixel(px + sx, py + sy, color);
                            }
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * TEXT_SCALE;
    }
}
