//! World bounds, torus geometry and boundary policies.

use crate::model::EnvironmentSettings;
use nalgebra::Vector2;

/// Rectangular world `[0, width) x [0, height)`, optionally toroidal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
    pub wraparound: bool,
}

impl Bounds {
    pub fn new(width: f64, height: f64, wraparound: bool) -> Self {
        Self {
            width,
            height,
            wraparound,
        }
    }

    pub fn from_settings(settings: &EnvironmentSettings) -> Self {
        Self::new(settings.width, settings.height, settings.wraparound)
    }

    /// Displacement from `from` to `to`.
    ///
    /// Under wraparound each axis takes the shorter of the direct and the
    /// wrap-around offset.
    pub fn delta(&self, from: Vector2<f64>, to: Vector2<f64>) -> Vector2<f64> {
        let d = to - from;
        if !self.wraparound {
            return d;
        }
        Vector2::new(shortest_offset(d.x, self.width), shortest_offset(d.y, self.height))
    }

    /// Distance from `a` to `b` under the boundary policy.
    pub fn distance(&self, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
        self.delta(a, b).norm()
    }

    /// Toroidal wrap into `[0, width) x [0, height)`.
    pub fn wrap(&self, p: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(wrap_axis(p.x, self.width), wrap_axis(p.y, self.height))
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamp(&self, p: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }

    /// Wraps under wraparound, clamps otherwise.
    pub fn settle(&self, p: Vector2<f64>) -> Vector2<f64> {
        if self.wraparound {
            self.wrap(p)
        } else {
            self.clamp(p)
        }
    }

    /// Reflects a position that crossed an edge back inside and points the
    /// matching velocity component inward.
    pub fn reflect(
        &self,
        position: Vector2<f64>,
        velocity: Vector2<f64>,
    ) -> (Vector2<f64>, Vector2<f64>) {
        let (x, vx) = reflect_axis(position.x, velocity.x, self.width);
        let (y, vy) = reflect_axis(position.y, velocity.y, self.height);
        (self.clamp(Vector2::new(x, y)), Vector2::new(vx, vy))
    }

    /// Returns true if `p` lies inside the closed rectangle.
    pub fn contains(&self, p: Vector2<f64>) -> bool {
        (0.0..=self.width).contains(&p.x) && (0.0..=self.height).contains(&p.y)
    }

    /// Squared distance from `p` to the closed rectangle (0 inside).
    pub(crate) fn rect_distance_2(&self, p: [f64; 2]) -> f64 {
        let dx = (-p[0]).max(p[0] - self.width).max(0.0);
        let dy = (-p[1]).max(p[1] - self.height).max(0.0);
        dx * dx + dy * dy
    }
}

fn wrap_axis(v: f64, size: f64) -> f64 {
    if size <= 0.0 {
        return 0.0;
    }
    let w = v.rem_euclid(size);
    // rem_euclid can round up to `size` for tiny negative inputs
    if w >= size {
        0.0
    } else {
        w
    }
}

fn shortest_offset(d: f64, size: f64) -> f64 {
    if size <= 0.0 {
        return d;
    }
    let d = d.rem_euclid(size);
    if d > size / 2.0 {
        d - size
    } else {
        d
    }
}

fn reflect_axis(p: f64, v: f64, size: f64) -> (f64, f64) {
    if p < 0.0 {
        (-p, v.abs())
    } else if p > size {
        (2.0 * size - p, -v.abs())
    } else {
        (p, v)
    }
}
