use anyhow::{bail, Result};
use log::{debug, warn};

use crate::config::Config;
use crate::feature::Descriptor;
use crate::image::Image;
use crate::kd_tree::KdTree;
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;
use crate::rect::{compute_window, Rect};

/// Tracking session lifecycle. `Lost` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Initialized,
    Tracking,
    Lost,
}

/// Per-frame result: the refreshed tracked rectangle and the search
/// window for the next frame.
#[derive(Clone, Copy, Debug)]
pub struct TrackUpdate {
    pub state: TrackerState,
    pub rect: Rect,
    pub window: Rect,
}

/// Single-object tracker over a fixed feature template.
///
/// Built once from the features detected on the first frame; each
/// subsequent frame is matched against the template through the k-d
/// tree, fused with per-point optical flow, and the tracked rectangle
/// and its padded search window are recomputed.
pub struct Tracker {
    template: Vec<Descriptor>,
    index: KdTree,
    optical_flow: OpticalFlow,
    config: Config,
    prev_frame: Image,
    /// Current position estimate per template feature, ordinal-indexed.
    points: Vec<Vector2d>,
    rect: Rect,
    window: Rect,
    /// Top-left offset of the tracked rect from the point centroid and
    /// the rect size, both fixed at construction.
    rect_offset: Vector2d,
    rect_size: Vector2d,
    state: TrackerState,
}

impl Tracker {
    /// Start a session from the template features of `initial_rect` on
    /// `initial_frame`. Template positions are relative to the rect's
    /// top-left corner.
    pub fn new(
        template: Vec<Descriptor>,
        initial_frame: Image,
        initial_rect: Rect,
        config: Config,
    ) -> Result<Tracker> {
        let index = KdTree::build(&template)?;
        let bounds = initial_frame.shape();

        let points: Vec<Vector2d> = template
            .iter()
            .map(|f| f.point + initial_rect.top_left())
            .collect();
        let centroid = points.iter().sum::<Vector2d>() / points.len() as f64;
        let rect_offset = initial_rect.top_left() - centroid;
        let rect_size = Vector2d::new(initial_rect.width, initial_rect.height);

        let rect = initial_rect.clamp(bounds);
        if rect.is_degenerate() {
            bail!("initial rectangle has no area inside the image");
        }
        let window = compute_window(&rect, config.window_padding, bounds);
        let optical_flow = OpticalFlow::new(config.flow_win_size);

        Ok(Tracker {
            template,
            index,
            optical_flow,
            config,
            prev_frame: initial_frame,
            points,
            rect,
            window,
            rect_offset,
            rect_size,
            state: TrackerState::Initialized,
        })
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn window(&self) -> Rect {
        self.window
    }

    /// Advance the session by one frame.
    ///
    /// Detections are matched against the template inside the current
    /// search window; every template point is then moved by the fusion
    /// rule (descriptor match, optical flow, or both), the tracked
    /// rectangle follows the point centroid at its fixed size, and the
    /// window is recomputed around it. The frame replaces the session's
    /// previous-frame buffer.
    ///
    /// The only error is a frame whose size differs from the session's;
    /// losing the track is an ordinary `Lost` outcome. Calling `update`
    /// on a lost session returns the last geometry unchanged.
    pub fn update(&mut self, frame: Image, detections: &[Descriptor]) -> Result<TrackUpdate> {
        if frame.shape() != self.prev_frame.shape() {
            bail!(
                "frame size {:?} does not match tracking session size {:?}",
                frame.shape(),
                self.prev_frame.shape()
            );
        }
        if self.state == TrackerState::Lost {
            return Ok(self.current());
        }
        let bounds = frame.shape();

        // Nearest template neighbor for each detection inside the search
        // window; per template point the lowest-distance detection wins.
        let mut matches: Vec<Option<(Vector2d, f64)>> = vec![None; self.template.len()];
        let mut outside = 0usize;
        for detection in detections {
            if !self.window.contains(&detection.point) {
                outside += 1;
                continue;
            }
            let neighbors =
                self.index
                    .knn(&self.template, &detection.vector, 1, self.config.bbf_max_checks);
            let Some(nearest) = neighbors.first() else {
                continue;
            };
            if nearest.dist_sq >= self.config.match_max_dist_sq {
                continue;
            }
            let slot = &mut matches[nearest.index];
            if slot.map_or(true, |(_, dist_sq)| nearest.dist_sq < dist_sq) {
                *slot = Some((detection.point, nearest.dist_sq));
            }
        }
        if outside > 0 {
            debug!("ignored {outside} detections outside the search window");
        }

        // Fuse the two position signals per template point. A strong
        // match overrides flow; a weak match averages with it; either
        // signal alone is used as-is; with neither the point is stale
        // for this frame.
        let mut updated = 0usize;
        for (i, point) in self.points.iter_mut().enumerate() {
            let flow_pos = self
                .optical_flow
                .estimate(&frame, &self.prev_frame, point)
                .map(|d| *point + d);
            let new_pos = match (matches[i], flow_pos) {
                (Some((matched, dist_sq)), _) if dist_sq < self.config.match_strong_dist_sq => {
                    Some(matched)
                }
                (Some((matched, _)), Some(flowed)) => Some((matched + flowed) / 2.),
                (Some((matched, _)), None) => Some(matched),
                (None, Some(flowed)) => Some(flowed),
                (None, None) => None,
            };
            if let Some(p) = new_pos {
                *point = p;
                updated += 1;
            }
        }
        debug!(
            "updated {updated}/{} tracked points from {} detections",
            self.points.len(),
            detections.len()
        );

        self.prev_frame = frame;

        if updated == 0 {
            warn!("track lost: no feature produced a position update");
            self.state = TrackerState::Lost;
            return Ok(self.current());
        }

        // The tracked rect keeps its size and follows the point centroid.
        let centroid = self.points.iter().sum::<Vector2d>() / self.points.len() as f64;
        let top_left = centroid + self.rect_offset;
        self.rect = Rect::new(top_left.x, top_left.y, self.rect_size.x, self.rect_size.y)
            .clamp(bounds);
        if self.rect.is_degenerate() {
            warn!("track lost: tracked rectangle left the image");
            self.state = TrackerState::Lost;
            return Ok(self.current());
        }

        self.window = compute_window(&self.rect, self.config.window_padding, bounds);
        self.state = TrackerState::Tracking;
        Ok(self.current())
    }

    fn current(&self) -> TrackUpdate {
        TrackUpdate {
            state: self.state,
            rect: self.rect,
            window: self.window,
        }
    }
}
