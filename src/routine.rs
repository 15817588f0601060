use crate::turtle::Turtle;

/// Something that draws on a surface.
///
/// It is invoked once per recording. Drawing may continue past the point where the recording
/// stops; completion is decided by the recorder's timeout, not by `draw` returning.
pub trait DrawRoutine<S> {
    fn draw(&mut self, surface: &mut S);
}

impl<S, F> DrawRoutine<S> for F
where
    F: FnMut(&mut S),
{
    fn draw(&mut self, surface: &mut S) {
        self(surface)
    }
}

/// Squares of side `side`, each rotated `step_deg` from the last.
#[derive(Clone, Debug)]
pub struct RotatingSquares {
    pub count: u32,
    pub side: f64,
    pub step_deg: f64,
    pub speed: f64,
}

impl Default for RotatingSquares {
    fn default() -> Self {
        Self {
            count: 36,
            side: 100.0,
            step_deg: 10.0,
            speed: 10.0,
        }
    }
}

impl DrawRoutine<Turtle> for RotatingSquares {
    fn draw(&mut self, t: &mut Turtle) {
        t.speed(self.speed);
        for _ in 0..self.count {
            for _ in 0..4 {
                t.forward(self.side);
                t.right(90.0);
            }
            t.right(self.step_deg);
        }
    }
}

/// An outward square spiral.
#[derive(Clone, Debug)]
pub struct Spiral {
    pub turns: u32,
    pub growth: f64,
    pub angle_deg: f64,
    pub speed: f64,
}

impl Default for Spiral {
    fn default() -> Self {
        Self {
            turns: 60,
            growth: 3.0,
            angle_deg: 91.0,
            speed: 8.0,
        }
    }
}

impl DrawRoutine<Turtle> for Spiral {
    fn draw(&mut self, t: &mut Turtle) {
        t.speed(self.speed);
        let palette = [[220, 60, 60], [60, 140, 220], [60, 180, 90], [230, 170, 40]];
        for i in 0..self.turns {
            t.pen_color(palette[i as usize % palette.len()]);
            t.forward(self.growth * f64::from(i + 1));
            t.left(self.angle_deg);
        }
    }
}
