//! 变换引擎：按顺序执行 (缩放, 旋转, 平移) 步骤。

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geometry::{Point2, Vector2};

/// 单个变换步骤。`rotation` 以角度计，`scale_y` 缺省时与 `scale_x` 相同。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    #[serde(default = "unit_scale", alias = "scaleX")]
    pub scale_x: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "scaleY")]
    pub scale_y: Option<f64>,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, alias = "x")]
    pub translate_x: f64,
    #[serde(default, alias = "y")]
    pub translate_y: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for TransformStep {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformStep {
    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: None,
            rotation: 0.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }

    /// 块参照的放置变换：先缩放、再旋转（角度）、最后平移到插入点。
    pub fn from_placement(position: Point2, scale: Vector2, rotation_degrees: f64) -> Self {
        Self {
            scale_x: scale.x(),
            scale_y: Some(scale.y()),
            rotation: rotation_degrees,
            translate_x: position.x(),
            translate_y: position.y(),
        }
    }

    #[inline]
    pub fn scale_y(&self) -> f64 {
        self.scale_y.unwrap_or(self.scale_x)
    }

    pub fn apply_point(&self, point: Point2) -> Point2 {
        let sx = point.x() * self.scale_x;
        let sy = point.y() * self.scale_y();
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let rx = sx * cos - sy * sin;
        let ry = sx * sin + sy * cos;
        Point2::new(rx + self.translate_x, ry + self.translate_y)
    }

    /// X 轴镜像 (`scale_x == -1`) 时角度取补，再叠加旋转，结果归一化到 [0, 2π)。
    pub fn apply_angle(&self, angle: f64) -> f64 {
        let mut result = angle;
        if self.scale_x == -1.0 {
            result = PI - result;
        }
        result += self.rotation.to_radians();
        normalize_angle(result)
    }

    #[inline]
    fn radius_factor(&self) -> f64 {
        self.scale_x.abs().max(self.scale_y().abs())
    }
}

pub fn apply_point(point: Point2, transforms: &[TransformStep]) -> Point2 {
    transforms
        .iter()
        .fold(point, |current, step| step.apply_point(current))
}

/// 空变换列表不改变角度（也不做归一化）。
pub fn apply_angle(angle: f64, transforms: &[TransformStep]) -> f64 {
    transforms
        .iter()
        .fold(angle, |current, step| step.apply_angle(current))
}

/// 半径的整体缩放系数：各步骤 max(|sx|, |sy|) 之积。
pub fn uniform_scale(transforms: &[TransformStep]) -> f64 {
    transforms
        .iter()
        .map(TransformStep::radius_factor)
        .product()
}

pub fn normalize_angle(angle: f64) -> f64 {
    let mut result = angle % TAU;
    if result < 0.0 {
        result += TAU;
    }
    result
}

/// 将起止角整理为 `start <= end` 的区间，起止相同视为整圆。
pub fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
    let start = normalize_angle(start);
    let mut end = normalize_angle(end);
    if (end - start).abs() < 1e-9 {
        end = start + TAU;
    } else if end < start {
        end += TAU;
    }
    (start, end)
}

#[inline]
pub fn polar_point(center: Point2, radius: f64, angle: f64) -> Point2 {
    center.translate(Vector2::from_angle(angle, radius))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_transform_list_is_noop() {
        let point = Point2::new(12.5, -3.0);
        assert_eq!(apply_point(point, &[]), point);
        assert!(approx(apply_angle(7.0, &[]), 7.0));
        assert!(approx(uniform_scale(&[]), 1.0));
    }

    #[test]
    fn step_scales_then_rotates_then_translates() {
        let step = TransformStep {
            scale_x: 2.0,
            scale_y: None,
            rotation: 90.0,
            translate_x: 10.0,
            translate_y: 0.0,
        };
        let result = apply_point(Point2::new(1.0, 0.0), &[step]);
        assert!(approx(result.x(), 10.0), "x = {}", result.x());
        assert!(approx(result.y(), 2.0), "y = {}", result.y());
    }

    #[test]
    fn steps_apply_in_order() {
        let translate = TransformStep {
            translate_x: 5.0,
            ..TransformStep::identity()
        };
        let rotate = TransformStep {
            rotation: 180.0,
            ..TransformStep::identity()
        };
        let a = apply_point(Point2::new(0.0, 0.0), &[translate, rotate]);
        let b = apply_point(Point2::new(0.0, 0.0), &[rotate, translate]);
        assert!(approx(a.x(), -5.0));
        assert!(approx(b.x(), 5.0));
    }

    #[test]
    fn mirrored_angle_reflects_and_normalizes() {
        let mirror = TransformStep {
            scale_x: -1.0,
            ..TransformStep::identity()
        };
        let angle = apply_angle(PI / 4.0, &[mirror]);
        assert!(approx(angle, 3.0 * PI / 4.0));

        let rotate = TransformStep {
            rotation: -90.0,
            ..TransformStep::identity()
        };
        let angle = apply_angle(0.0, &[rotate]);
        assert!(approx(angle, 3.0 * PI / 2.0));
    }

    #[test]
    fn placement_step_matches_insert_semantics() {
        let step =
            TransformStep::from_placement(Point2::new(100.0, 50.0), Vector2::new(2.0, 3.0), 0.0);
        let result = step.apply_point(Point2::new(1.0, 1.0));
        assert!(approx(result.x(), 102.0));
        assert!(approx(result.y(), 53.0));
        assert!(approx(uniform_scale(&[step, step]), 9.0));
    }

    #[test]
    fn canonical_interval_wraps_end_past_start() {
        let (start, end) = canonical_interval(3.0 * PI / 2.0, PI / 2.0);
        assert!(approx(start, 3.0 * PI / 2.0));
        assert!(approx(end, 5.0 * PI / 2.0));
        let (start, end) = canonical_interval(1.0, 1.0);
        assert!(approx(end - start, TAU));
    }

    #[test]
    fn transform_step_deserializes_short_aliases() {
        let step: TransformStep =
            serde_json::from_str(r#"{"scaleX": 2, "rotation": 45, "x": 3, "y": 4}"#)
                .expect("step");
        assert!(approx(step.scale_y(), 2.0));
        assert!(approx(step.translate_x, 3.0));
        assert!(approx(step.translate_y, 4.0));
    }
}
