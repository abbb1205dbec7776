use crate::image::Image;
use crate::my_types::*;

/// Threshold below which a singular value of the gradient structure
/// matrix is treated as zero in the pseudo-inverse.
const SVD_EPS: f64 = 1e-9;

/// Local differential optical-flow estimator.
///
/// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
pub struct OpticalFlow {
    win_half: i64,
}

impl OpticalFlow {
    /// `win_size` is the side of the square integration window; even
    /// values are widened to the next odd size.
    pub fn new(win_size: usize) -> OpticalFlow {
        let win_size = if win_size % 2 == 0 {
            win_size + 1
        } else {
            win_size
        };
        OpticalFlow {
            win_half: (win_size / 2) as i64,
        }
    }

    /// Displacement (dx, dy) of the patch around `point` between
    /// `previous` and `current`, from a single least-squares solve over
    /// the integration window.
    ///
    /// Gradients are central differences on the current frame; samples
    /// falling outside the image clamp to the nearest edge pixel. Returns
    /// None when `point` itself lies outside the image. A textureless
    /// window makes the structure matrix singular; the SVD pseudo-inverse
    /// then yields a best-effort finite vector instead of failing.
    pub fn estimate(
        &self,
        current: &Image,
        previous: &Image,
        point: &Vector2d,
    ) -> Option<Vector2d> {
        if !current.in_bounds(point.x, point.y) {
            return None;
        }
        let cx = point.x.round() as i64;
        let cy = point.y.round() as i64;

        let mut m_xx = 0.;
        let mut m_xy = 0.;
        let mut m_yy = 0.;
        let mut b = Vector2d::zeros();
        for j in -self.win_half..=self.win_half {
            for i in -self.win_half..=self.win_half {
                let x = cx + i;
                let y = cy + j;
                let gx = (current.value_clamped(x + 1, y) as f64
                    - current.value_clamped(x - 1, y) as f64)
                    / 2.;
                let gy = (current.value_clamped(x, y + 1) as f64
                    - current.value_clamped(x, y - 1) as f64)
                    / 2.;
                let dt =
                    current.value_clamped(x, y) as f64 - previous.value_clamped(x, y) as f64;
                m_xx += gx * gx;
                m_xy += gx * gy;
                m_yy += gy * gy;
                b.x += gx * dt;
                b.y += gy * dt;
            }
        }

        let m = Matrix2d::new(m_xx, m_xy, m_xy, m_yy);
        let inverse = m.pseudo_inverse(SVD_EPS).ok()?;
        Some(inverse * -b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Radial intensity blob, brightest at the center.
    fn blob_patch(size: usize, peak: f64) -> Image {
        let r = (size - 1) as f64 / 2.;
        let mut data = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let d = (x as f64 - r).hypot(y as f64 - r);
                data.push((peak * (1. - d / (r + 1.))).clamp(0., 255.) as u8);
            }
        }
        Image::new(data, size, size)
    }

    fn shifted_pair(patch: &Image, dx: i64, dy: i64) -> (Image, Image, Vector2d) {
        let mut previous = Image::new(vec![0; 128 * 128], 128, 128);
        let mut current = previous.clone();
        previous.set_sub_image(60, 60, patch);
        current.set_sub_image(60 + dx, 60 + dy, patch);
        let center = Vector2d::new(
            (60 + patch.width as i64 / 2) as f64,
            (60 + patch.height as i64 / 2) as f64,
        );
        (previous, current, center)
    }

    #[test]
    fn test_identical_frames_give_zero_flow() {
        let patch = blob_patch(21, 240.);
        let (previous, _, center) = shifted_pair(&patch, 0, 0);
        let flow = OpticalFlow::new(11);
        let v = flow.estimate(&previous, &previous, &center).unwrap();
        assert_eq!(v, Vector2d::zeros());
    }

    #[test]
    fn test_small_shift_recovered() {
        let patch = blob_patch(21, 240.);
        let (previous, current, center) = shifted_pair(&patch, 1, 1);
        let flow = OpticalFlow::new(11);
        let v = flow.estimate(&current, &previous, &center).unwrap();
        assert!((v - Vector2d::new(1., 1.)).norm() < 0.25, "v = {v:?}");
    }

    #[test]
    fn test_larger_shift_recovered() {
        let patch = blob_patch(31, 240.);
        let (previous, current, center) = shifted_pair(&patch, 2, 3);
        let flow = OpticalFlow::new(21);
        let v = flow.estimate(&current, &previous, &center).unwrap();
        assert!((v - Vector2d::new(2., 3.)).norm() < 0.5, "v = {v:?}");
    }

    #[test]
    fn test_negative_shift_recovered() {
        let patch = blob_patch(21, 240.);
        let (previous, current, center) = shifted_pair(&patch, -2, 1);
        let flow = OpticalFlow::new(15);
        let v = flow.estimate(&current, &previous, &center).unwrap();
        assert!((v - Vector2d::new(-2., 1.)).norm() < 0.3, "v = {v:?}");
    }

    #[test]
    fn test_textureless_patch_is_finite() {
        let previous = Image::new(vec![50; 64 * 64], 64, 64);
        let current = Image::new(vec![80; 64 * 64], 64, 64);
        let flow = OpticalFlow::new(7);
        let v = flow
            .estimate(&current, &previous, &Vector2d::new(32., 32.))
            .unwrap();
        assert!(v.x.is_finite() && v.y.is_finite());
    }

    #[test]
    fn test_point_outside_image_rejected() {
        let image = Image::new(vec![0; 64 * 64], 64, 64);
        let flow = OpticalFlow::new(7);
        assert!(flow
            .estimate(&image, &image, &Vector2d::new(70., 10.))
            .is_none());
        assert!(flow
            .estimate(&image, &image, &Vector2d::new(10., -1.))
            .is_none());
    }

    #[test]
    fn test_near_edge_point_clamps_instead_of_failing() {
        let patch = blob_patch(15, 200.);
        let mut previous = Image::new(vec![0; 64 * 64], 64, 64);
        previous.set_sub_image(0, 0, &patch);
        let current = previous.clone();
        let flow = OpticalFlow::new(9);
        // window extends past the top-left corner
        let v = flow
            .estimate(&current, &previous, &Vector2d::new(1., 1.))
            .unwrap();
        assert_eq!(v, Vector2d::zeros());
    }
}
