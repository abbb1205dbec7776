use nalgebra as na;

/// Image-space point or displacement, x = column, y = row.
/// The same type carries both interpretations; callers keep track of
/// which one applies.
pub type Vector2d = na::Vector2<f64>;

pub type Matrix2d = na::Matrix2<f64>;

/// (width, height) of a frame in pixels.
pub type ImageShape = (usize, usize);
