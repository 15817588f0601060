//! A turtle-graphics surface with its own animation timeline.
//!
//! Moves and turns are not instantaneous: at speeds 1..=10 each one occupies a number of
//! animation hops (one hop per `hop_delay`), like classic turtle graphics does on screen. The
//! surface keeps every stroke with the time span it is drawn over, so a snapshot taken at any
//! instant shows the strokes completed by then and a partial stroke for the one in progress.

use std::{path::Path, time::Duration};

use anyhow::Context as _;
use kurbo::{Affine, Line, Point, Vec2};

use crate::{
    error::ReelResult,
    surface::{Surface, VectorFormat},
};

pub const DEFAULT_HOP_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_SPEED: u8 = 3;

#[derive(Clone, Debug)]
struct Stroke {
    line: Line,
    start: Duration,
    end: Duration,
    color: [u8; 3],
    width: f64,
}

impl Stroke {
    fn visible_at(&self, t: Duration) -> Option<Line> {
        if t < self.start {
            return None;
        }
        if t >= self.end {
            return Some(self.line);
        }
        let frac = (t - self.start).as_secs_f64() / (self.end - self.start).as_secs_f64();
        if frac <= 0.0 {
            return None;
        }
        Some(Line::new(self.line.p0, self.line.p0.lerp(self.line.p1, frac)))
    }
}

#[derive(Clone, Debug)]
pub struct Turtle {
    width: u32,
    height: u32,
    background: [u8; 3],
    hop_delay: Duration,

    position: Point,
    heading_deg: f64,
    pen_down: bool,
    pen_color: [u8; 3],
    pen_width: f64,
    speed: u8,

    /// When the last queued move finishes.
    busy_until: Duration,
    /// The instant snapshots observe.
    view: Duration,
    strokes: Vec<Stroke>,
}

impl Turtle {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: [255, 255, 255],
            hop_delay: DEFAULT_HOP_DELAY,
            position: Point::ORIGIN,
            heading_deg: 0.0,
            pen_down: true,
            pen_color: [0, 0, 0],
            pen_width: 1.0,
            speed: DEFAULT_SPEED,
            busy_until: Duration::ZERO,
            view: Duration::ZERO,
            strokes: Vec::new(),
        }
    }

    pub fn with_hop_delay(mut self, hop_delay: Duration) -> Self {
        self.hop_delay = hop_delay;
        self
    }

    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn heading(&self) -> f64 {
        self.heading_deg
    }

    pub fn speed_level(&self) -> u8 {
        self.speed
    }

    pub fn busy_until(&self) -> Duration {
        self.busy_until
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    /// Values outside `0.5..10.5` mean "instant" (level 0); everything else rounds to 1..=10.
    pub fn speed(&mut self, speed: f64) {
        self.speed = if speed > 0.5 && speed < 10.5 {
            speed.round() as u8
        } else {
            0
        };
    }

    pub fn pen_up(&mut self) {
        self.pen_down = false;
    }

    pub fn pen_down(&mut self) {
        self.pen_down = true;
    }

    pub fn pen_color(&mut self, rgb: [u8; 3]) {
        self.pen_color = rgb;
    }

    pub fn pen_size(&mut self, width: f64) {
        self.pen_width = width.max(0.0);
    }

    pub fn forward(&mut self, distance: f64) {
        let rad = self.heading_deg.to_radians();
        let target = self.position + Vec2::new(rad.cos(), rad.sin()) * distance;
        self.move_to(target);
    }

    pub fn backward(&mut self, distance: f64) {
        self.forward(-distance);
    }

    pub fn goto(&mut self, x: f64, y: f64) {
        self.move_to(Point::new(x, y));
    }

    /// Turn clockwise.
    pub fn right(&mut self, degrees: f64) {
        self.turn(-degrees);
    }

    /// Turn counter-clockwise.
    pub fn left(&mut self, degrees: f64) {
        self.turn(degrees);
    }

    pub fn set_heading(&mut self, degrees: f64) {
        let delta = degrees - self.heading_deg;
        self.turn(delta);
    }

    fn begin(&self) -> Duration {
        self.busy_until.max(self.view)
    }

    fn move_to(&mut self, target: Point) {
        let start = self.begin();
        let distance = self.position.distance(target);
        let end = start.saturating_add(self.move_duration(distance));
        if self.pen_down && distance > 0.0 {
            self.strokes.push(Stroke {
                line: Line::new(self.position, target),
                start,
                end,
                color: self.pen_color,
                width: self.pen_width,
            });
        }
        self.position = target;
        self.busy_until = end;
    }

    fn turn(&mut self, degrees: f64) {
        let start = self.begin();
        self.busy_until = start.saturating_add(self.turn_duration(degrees));
        self.heading_deg = (self.heading_deg + degrees).rem_euclid(360.0);
    }

    fn move_duration(&self, distance: f64) -> Duration {
        if self.speed == 0 || distance == 0.0 {
            return Duration::ZERO;
        }
        let s = f64::from(self.speed);
        let per_hop = 3.0 * 1.1f64.powf(s) * s;
        self.hop_span(distance / per_hop)
    }

    fn turn_duration(&self, degrees: f64) -> Duration {
        if self.speed == 0 || degrees == 0.0 {
            return Duration::ZERO;
        }
        let per_hop = 3.0 * f64::from(self.speed);
        self.hop_span(degrees.abs() / per_hop)
    }

    /// One hop plus one per whole `per_hop` unit. Huge amounts saturate instead of wrapping.
    fn hop_span(&self, units: f64) -> Duration {
        // `as` saturates: NaN -> 0, anything past u32::MAX -> u32::MAX.
        let hops = (units as u32).saturating_add(1);
        self.hop_delay.checked_mul(hops).unwrap_or(Duration::MAX)
    }

    /// Turtle space (origin centered, y up) to SVG space (origin top-left, y down).
    fn to_screen(&self) -> Affine {
        Affine::new([
            1.0,
            0.0,
            0.0,
            -1.0,
            f64::from(self.width) / 2.0,
            f64::from(self.height) / 2.0,
        ])
    }

    pub fn render_svg(&self) -> String {
        let (w, h) = (self.width, self.height);
        let mut out = String::new();
        out.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
        ));
        out.push_str(&format!(
            "<rect width=\"{w}\" height=\"{h}\" fill=\"{}\"/>\n",
            hex(self.background)
        ));

        let xf = self.to_screen();
        for stroke in &self.strokes {
            let Some(line) = stroke.visible_at(self.view) else {
                continue;
            };
            let (p0, p1) = (xf * line.p0, xf * line.p1);
            out.push_str(&format!(
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"{:.2}\" stroke-linecap=\"butt\"/>\n",
                p0.x,
                p0.y,
                p1.x,
                p1.y,
                hex(stroke.color),
                stroke.width
            ));
        }
        out.push_str("</svg>\n");
        out
    }
}

fn hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

impl Surface for Turtle {
    fn reset(&mut self) {
        *self = Self::new(self.width, self.height)
            .with_hop_delay(self.hop_delay)
            .with_background(self.background);
    }

    fn seek(&mut self, now: Duration) {
        self.view = now;
    }

    fn snapshot_to(&self, path: &Path, format: VectorFormat) -> ReelResult<()> {
        let body = match format {
            VectorFormat::Svg => self.render_svg(),
        };
        std::fs::write(path, body)
            .with_context(|| format!("failed to write snapshot '{}'", path.display()))?;
        Ok(())
    }
}
