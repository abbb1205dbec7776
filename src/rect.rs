use crate::my_types::*;

/// Axis-aligned rectangle in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn top_left(&self) -> Vector2d {
        Vector2d::new(self.left, self.top)
    }

    pub fn center(&self) -> Vector2d {
        Vector2d::new(self.left + self.width / 2., self.top + self.height / 2.)
    }

    pub fn contains(&self, point: &Vector2d) -> bool {
        point.x >= self.left
            && point.x < self.right()
            && point.y >= self.top
            && point.y < self.bottom()
    }

    /// Zero or negative extent: nothing to search, tolerated downstream.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0. || self.height <= 0.
    }

    /// Clamp to [0, width) x [0, height) by shrinking, never translating:
    /// overflow on any side is removed from the extent, and a negative
    /// top/left is pinned to zero. Idempotent on already-clamped input.
    pub fn clamp(&self, bounds: ImageShape) -> Rect {
        let (image_width, image_height) = (bounds.0 as f64, bounds.1 as f64);
        let mut r = *self;
        if r.top < 0. {
            r.height -= -r.top;
            r.top = 0.;
        }
        if r.bottom() > image_height {
            r.height -= r.bottom() - image_height;
        }
        if r.left < 0. {
            r.width -= -r.left;
            r.left = 0.;
        }
        if r.right() > image_width {
            r.width -= r.right() - image_width;
        }
        r.width = r.width.max(0.);
        r.height = r.height.max(0.);
        r
    }
}

/// Padded search window around a target rectangle.
///
/// The window grows by `padding * width` on each horizontal side and
/// `padding * height` on each vertical side, then clamps to the image.
pub fn compute_window(target: &Rect, padding: f64, bounds: ImageShape) -> Rect {
    let dx = padding * target.width;
    let dy = padding * target.height;
    Rect {
        left: target.left - dx,
        top: target.top - dy,
        width: target.width + 2. * dx,
        height: target.height + 2. * dy,
    }
    .clamp(bounds)
}
