//! Mapping heatmap coordinates back to original image pixels.
//!
//! A top-down pose model sees a crop described by a bounding-box
//! center/scale pair; the crop is resized to the network input and the
//! heatmap is a further down-sampled grid. [`transform_preds`] inverts that
//! chain for one instance.
//!
//! Two conventions are supported:
//!
//! - **biased** – invert the affine transform from the reference box
//!   `scale * PIXEL_STD` to the `[W, H]` heatmap grid
//!   ([`get_affine_transform`]);
//! - **UDP** (unbiased data processing) – a direct scale-and-shift using
//!   `size - 1` pixel spacing, which removes the half-pixel bias the biased
//!   convention introduces at low heatmap resolution.

use nalgebra::{Matrix2x3, Matrix3, Vector2};
use ndarray::{Array2, ArrayView2};

/// Reference box size that `scale` is expressed relative to.
pub const PIXEL_STD: f64 = 200.0;

/// Bounding-box descriptor of one instance.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CenterScale {
    /// Box center (x, y) in image pixels.
    pub center: [f64; 2],
    /// Box size (w, h) in units of [`PIXEL_STD`] pixels.
    pub scale: [f64; 2],
}

impl CenterScale {
    pub fn new(center: [f64; 2], scale: [f64; 2]) -> Self {
        Self { center, scale }
    }

    /// Descriptor of a box given in pixels.
    pub fn from_box_px(center: [f64; 2], size_px: [f64; 2]) -> Self {
        Self {
            center,
            scale: [size_px[0] / PIXEL_STD, size_px[1] / PIXEL_STD],
        }
    }

    /// Box size in pixels.
    pub fn size_px(&self) -> [f64; 2] {
        [self.scale[0] * PIXEL_STD, self.scale[1] * PIXEL_STD]
    }
}

fn rotate_point(p: Vector2<f64>, angle_rad: f64) -> Vector2<f64> {
    let (sn, cs) = angle_rad.sin_cos();
    Vector2::new(p.x * cs - p.y * sn, p.x * sn + p.y * cs)
}

/// Third point completing a right angle at `b`: `b + rot90(a - b)`.
fn third_point(a: Vector2<f64>, b: Vector2<f64>) -> Vector2<f64> {
    let d = a - b;
    b + Vector2::new(-d.y, d.x)
}

/// Exact affine map taking three `src` points onto three `dst` points.
fn affine_from_points(src: [Vector2<f64>; 3], dst: [Vector2<f64>; 3]) -> Option<Matrix2x3<f64>> {
    let s = Matrix3::from_columns(&src.map(|p| p.push(1.0)));
    let d = Matrix3::from_columns(&dst.map(|p| p.push(1.0)));
    let m = d * s.try_inverse()?;
    Some(m.fixed_view::<2, 3>(0, 0).into_owned())
}

/// Affine transform between the box `(center, scale)` and an
/// `output_size = [W, H]` grid.
///
/// The box is `scale * PIXEL_STD` wide; only its width fixes the mapping,
/// so boxes are expected to share the output aspect ratio. `rot_deg`
/// rotates the box around its center and `shift` moves it by a fraction of
/// its size. With `inv` the transform maps grid → image instead of
/// image → grid.
pub fn get_affine_transform(
    cs: &CenterScale,
    rot_deg: f64,
    output_size: [usize; 2],
    shift: [f64; 2],
    inv: bool,
) -> Matrix2x3<f64> {
    let size = cs.size_px();
    let src_w = size[0];
    let dst_w = output_size[0] as f64;
    let dst_h = output_size[1] as f64;

    let src_dir = rotate_point(Vector2::new(0.0, src_w * -0.5), rot_deg.to_radians());
    let dst_dir = Vector2::new(0.0, dst_w * -0.5);

    let center = Vector2::new(cs.center[0], cs.center[1]);
    let offset = Vector2::new(size[0] * shift[0], size[1] * shift[1]);
    let src0 = center + offset;
    let src1 = src0 + src_dir;
    let src = [src0, src1, third_point(src0, src1)];

    let dst0 = Vector2::new(dst_w * 0.5, dst_h * 0.5);
    let dst1 = dst0 + dst_dir;
    let dst = [dst0, dst1, third_point(dst0, dst1)];

    let (from, to) = if inv { (dst, src) } else { (src, dst) };
    // The three points are never collinear for a non-empty box.
    affine_from_points(from, to).unwrap_or_else(|| {
        tracing::warn!(?cs, "degenerate box, falling back to identity affine");
        Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    })
}

/// Apply a 2×3 affine matrix to a point.
pub fn affine_transform_point(m: &Matrix2x3<f64>, xy: [f64; 2]) -> [f64; 2] {
    let p = m * nalgebra::Vector3::new(xy[0], xy[1], 1.0);
    [p.x, p.y]
}

/// Map `[K, 2]` heatmap coordinates of one instance to image pixels.
///
/// `output_size` is the heatmap size `[W, H]`. Sentinel coordinates are
/// mapped like any other point; validity travels with the score.
pub fn transform_preds(
    coords: ArrayView2<f32>,
    cs: &CenterScale,
    output_size: [usize; 2],
    use_udp: bool,
) -> Array2<f32> {
    let mut out = coords.to_owned();
    if use_udp {
        let size = cs.size_px();
        let sx = size[0] / (output_size[0] as f64 - 1.0);
        let sy = size[1] / (output_size[1] as f64 - 1.0);
        for mut row in out.rows_mut() {
            row[0] = (row[0] as f64 * sx + cs.center[0] - size[0] * 0.5) as f32;
            row[1] = (row[1] as f64 * sy + cs.center[1] - size[1] * 0.5) as f32;
        }
    } else {
        let m = get_affine_transform(cs, 0.0, output_size, [0.0, 0.0], true);
        for mut row in out.rows_mut() {
            let p = affine_transform_point(&m, [row[0] as f64, row[1] as f64]);
            row[0] = p[0] as f32;
            row[1] = p[1] as f32;
        }
    }
    out
}
