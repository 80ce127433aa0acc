//! Pure transform math: given source and target dimensions, compute the
//! output canvas, the destination placement, and the source sampling
//! rectangle. No pixel access happens here; [`crate::codec`] executes plans.
//!
//! All four methods truncate fractional dimensions (round toward zero) and
//! clamp sampling rectangles to the source bounds, so a plan can never ask
//! the resampler to read outside the image.

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// A fully resolved transform: crop `source` out of the original, resample
/// it to `dest.width × dest.height`, and place it at `dest.x, dest.y` on a
/// canvas of `canvas_width × canvas_height`.
///
/// For resize and crop the destination covers the whole canvas; only fit
/// produces a smaller destination (the padding band around it is filled by
/// the codec, white for opaque formats and transparent otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformPlan {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub dest: Rect,
    pub source: Rect,
}

/// Proportional resize: shrink the requested box until it matches the
/// source aspect ratio, so neither output dimension exceeds its bound and
/// at least one matches exactly. Output dimensions may differ from the
/// requested box.
pub fn resize_plan(source_w: u32, source_h: u32, target_w: u32, target_h: u32) -> TransformPlan {
    let aspect = source_w as f64 / source_h as f64;
    let (out_w, out_h) = if target_w as f64 / target_h as f64 > aspect {
        (target_h as f64 * aspect, target_h as f64)
    } else {
        (target_w as f64, target_w as f64 / aspect)
    };
    let out_w = (out_w as u32).max(1);
    let out_h = (out_h as u32).max(1);

    TransformPlan {
        canvas_width: out_w,
        canvas_height: out_h,
        dest: Rect::full(out_w, out_h),
        source: Rect::full(source_w, source_h),
    }
}

/// Largest source rectangle matching the target aspect ratio. The excess
/// axis is the one that gets cropped; the rectangle never exceeds the
/// source on either axis.
fn aspect_matched_rect(source_w: u32, source_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let source_aspect = source_w as f64 / source_h as f64;
    let target_aspect = target_w as f64 / target_h as f64;

    if source_aspect > target_aspect {
        // Source is wider, crop width.
        let crop_w = (source_h as f64 * target_aspect) as u32;
        (crop_w.clamp(1, source_w), source_h)
    } else {
        // Source is taller, crop height.
        let crop_h = (source_w as f64 / target_aspect) as u32;
        (source_w, crop_h.clamp(1, source_h))
    }
}

/// Center crop: exact `target_w × target_h` output, sampled from an
/// aspect-matched rectangle centered on the source.
pub fn crop_plan(source_w: u32, source_h: u32, target_w: u32, target_h: u32) -> TransformPlan {
    let (crop_w, crop_h) = aspect_matched_rect(source_w, source_h, target_w, target_h);
    let src_x = (source_w - crop_w) / 2;
    let src_y = (source_h - crop_h) / 2;

    TransformPlan {
        canvas_width: target_w,
        canvas_height: target_h,
        dest: Rect::full(target_w, target_h),
        source: Rect::new(src_x, src_y, crop_w, crop_h),
    }
}

/// Letterbox fit: scale the whole source to fit inside the target box,
/// then center it on a canvas of exactly the target size.
pub fn fit_plan(source_w: u32, source_h: u32, target_w: u32, target_h: u32) -> TransformPlan {
    let aspect = source_w as f64 / source_h as f64;
    let target_aspect = target_w as f64 / target_h as f64;

    let (dest_w, dest_h) = if aspect > target_aspect {
        (target_w as f64, target_w as f64 / aspect)
    } else {
        (target_h as f64 * aspect, target_h as f64)
    };
    let dest_w = (dest_w as u32).max(1);
    let dest_h = (dest_h as u32).max(1);

    TransformPlan {
        canvas_width: target_w,
        canvas_height: target_h,
        dest: Rect::new(
            (target_w - dest_w) / 2,
            (target_h - dest_h) / 2,
            dest_w,
            dest_h,
        ),
        source: Rect::full(source_w, source_h),
    }
}

/// Smart crop: same output as [`crop_plan`], but the sampling rectangle is
/// positioned around a focal point instead of the image center.
///
/// With `rule_of_thirds`, the rectangle is nudged so the focal point lands
/// on one of the four rule-of-thirds intersections of the crop box. Each
/// intersection yields a candidate origin; after clamping to the source
/// bounds, the candidate whose focal point sits closest to its intersection
/// wins. Without it, the rectangle is centered on the focal point (still
/// clamped).
pub fn smart_crop_plan(
    source_w: u32,
    source_h: u32,
    target_w: u32,
    target_h: u32,
    focal_x: u32,
    focal_y: u32,
    rule_of_thirds: bool,
) -> TransformPlan {
    let (crop_w, crop_h) = aspect_matched_rect(source_w, source_h, target_w, target_h);

    let (src_x, src_y) = if rule_of_thirds {
        thirds_origin(source_w, source_h, crop_w, crop_h, focal_x, focal_y)
    } else {
        centered_origin(source_w, source_h, crop_w, crop_h, focal_x, focal_y)
    };

    TransformPlan {
        canvas_width: target_w,
        canvas_height: target_h,
        dest: Rect::full(target_w, target_h),
        source: Rect::new(src_x, src_y, crop_w, crop_h),
    }
}

fn clamp_origin(focal: u32, half: u32, crop: u32, source: u32) -> u32 {
    let ideal = focal.saturating_sub(half);
    ideal.min(source - crop)
}

/// Crop origin that puts the focal point at the rectangle center, clamped
/// to the source.
fn centered_origin(
    source_w: u32,
    source_h: u32,
    crop_w: u32,
    crop_h: u32,
    focal_x: u32,
    focal_y: u32,
) -> (u32, u32) {
    (
        clamp_origin(focal_x, crop_w / 2, crop_w, source_w),
        clamp_origin(focal_y, crop_h / 2, crop_h, source_h),
    )
}

/// Crop origin aligning the focal point with the rule-of-thirds
/// intersection that survives clamping best.
fn thirds_origin(
    source_w: u32,
    source_h: u32,
    crop_w: u32,
    crop_h: u32,
    focal_x: u32,
    focal_y: u32,
) -> (u32, u32) {
    let offsets_x = [crop_w / 3, 2 * crop_w / 3];
    let offsets_y = [crop_h / 3, 2 * crop_h / 3];

    let mut best = centered_origin(source_w, source_h, crop_w, crop_h, focal_x, focal_y);
    let mut best_dist = u64::MAX;

    for &ix in &offsets_x {
        for &iy in &offsets_y {
            let ox = clamp_origin(focal_x, ix, crop_w, source_w);
            let oy = clamp_origin(focal_y, iy, crop_h, source_h);
            // Where the focal point actually lands inside this crop.
            let landed_x = focal_x.saturating_sub(ox);
            let landed_y = focal_y.saturating_sub(oy);
            let dx = landed_x.abs_diff(ix) as u64;
            let dy = landed_y.abs_diff(iy) as u64;
            let dist = dx * dx + dy * dy;
            if dist < best_dist {
                best_dist = dist;
                best = (ox, oy);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_landscape_binds_on_width() {
        let plan = resize_plan(800, 600, 400, 400);
        assert_eq!(plan.canvas_width, 400);
        assert_eq!(plan.canvas_height, 300);
        assert_eq!(plan.source, Rect::full(800, 600));
    }

    #[test]
    fn resize_portrait_binds_on_height() {
        let plan = resize_plan(600, 800, 400, 400);
        assert_eq!(plan.canvas_width, 300);
        assert_eq!(plan.canvas_height, 400);
    }

    #[test]
    fn resize_never_exceeds_the_requested_box() {
        for (sw, sh) in [(1920, 1080), (1080, 1920), (333, 777), (50, 50)] {
            let plan = resize_plan(sw, sh, 150, 150);
            assert!(plan.canvas_width <= 150);
            assert!(plan.canvas_height <= 150);
            assert!(plan.canvas_width == 150 || plan.canvas_height == 150);
        }
    }

    #[test]
    fn resize_of_exact_aspect_matches_target() {
        let plan = resize_plan(1000, 1000, 150, 150);
        assert_eq!((plan.canvas_width, plan.canvas_height), (150, 150));
    }

    #[test]
    fn crop_wide_source_into_square() {
        // 500x300 into 150x150: the sampling rect keeps the full height
        // and takes a centered 300px-wide band.
        let plan = crop_plan(500, 300, 150, 150);
        assert_eq!((plan.canvas_width, plan.canvas_height), (150, 150));
        assert_eq!(plan.source, Rect::new(100, 0, 300, 300));
    }

    #[test]
    fn crop_tall_source_into_square() {
        let plan = crop_plan(300, 500, 150, 150);
        assert_eq!(plan.source, Rect::new(0, 100, 300, 300));
    }

    #[test]
    fn crop_always_produces_exact_target() {
        for (sw, sh) in [(2000, 100), (100, 2000), (151, 149), (150, 150)] {
            let plan = crop_plan(sw, sh, 150, 150);
            assert_eq!((plan.canvas_width, plan.canvas_height), (150, 150));
            assert!(plan.source.x + plan.source.width <= sw);
            assert!(plan.source.y + plan.source.height <= sh);
        }
    }

    #[test]
    fn fit_pads_the_short_axis() {
        let plan = fit_plan(800, 600, 150, 150);
        assert_eq!((plan.canvas_width, plan.canvas_height), (150, 150));
        assert_eq!(plan.dest, Rect::new(0, 19, 150, 112));
        assert_eq!(plan.source, Rect::full(800, 600));
    }

    #[test]
    fn fit_of_exact_aspect_fills_the_canvas() {
        let plan = fit_plan(300, 300, 150, 150);
        assert_eq!(plan.dest, Rect::full(150, 150));
    }

    #[test]
    fn smart_crop_centers_on_focal_point() {
        // Focal at (400, 150) in a 500x300 source, square target: the
        // 300x300 band shifts right to center the focal point.
        let plan = smart_crop_plan(500, 300, 150, 150, 400, 150, false);
        assert_eq!(plan.source, Rect::new(200, 0, 300, 300));
    }

    #[test]
    fn smart_crop_clamps_at_source_edges() {
        let plan = smart_crop_plan(500, 300, 150, 150, 490, 150, false);
        assert_eq!(plan.source.x + plan.source.width, 500);

        let plan = smart_crop_plan(500, 300, 150, 150, 5, 150, false);
        assert_eq!(plan.source.x, 0);
    }

    #[test]
    fn rule_of_thirds_lands_focal_on_an_intersection() {
        // Plenty of room on both sides: the focal point must end up on one
        // of the four third-line intersections of the 300x300 crop.
        let plan = smart_crop_plan(900, 300, 150, 150, 450, 150, true);
        let landed_x = 450 - plan.source.x;
        assert!(landed_x == 100 || landed_x == 200, "landed at {landed_x}");
    }

    #[test]
    fn rule_of_thirds_degrades_under_clamping() {
        // Focal in the far corner: no intersection is reachable exactly,
        // but the rect stays inside the source.
        let plan = smart_crop_plan(500, 300, 150, 150, 499, 299, true);
        assert!(plan.source.x + plan.source.width <= 500);
        assert!(plan.source.y + plan.source.height <= 300);
    }

    #[test]
    fn upscale_crop_from_small_source() {
        // Source smaller than target: the whole source is sampled and
        // upscaled to the exact target.
        let plan = crop_plan(100, 100, 150, 150);
        assert_eq!(plan.source, Rect::full(100, 100));
        assert_eq!((plan.canvas_width, plan.canvas_height), (150, 150));
    }
}
