pub mod config;
pub mod feature;
pub mod image;
pub mod kd_tree;
pub mod my_types;
pub mod optical_flow;
pub mod rect;
pub mod tracker;

// Re-export main types
pub use crate::config::Config;
pub use crate::feature::Descriptor;
pub use crate::image::Image;
pub use crate::kd_tree::{KdTree, Neighbor};
pub use crate::my_types::Vector2d;
pub use crate::optical_flow::OpticalFlow;
pub use crate::rect::{compute_window, Rect};
pub use crate::tracker::{TrackUpdate, Tracker, TrackerState};
