pub mod annotation;
pub mod entity;
pub mod text;
pub mod transform;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，序列化为 `[x, y]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        pub const ORIGIN: Point2 = Point2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 解析器常把缺失坐标写成 (0,0)，探测时需要识别这种占位值。
        #[inline]
        pub fn is_origin(self) -> bool {
            self.0.x == 0.0 && self.0.y == 0.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，块参照的缩放因子也用它表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn from_angle(angle: f64, length: f64) -> Self {
            Self(DVec2::new(angle.cos(), angle.sin()) * length)
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算图纸/实体范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由点集构造范围；忽略非有限坐标，点集为空时返回 None。
        pub fn from_points<I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if !point.is_finite() {
                return;
            }
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        #[inline]
        pub fn larger_dimension(&self) -> f64 {
            self.width().max(self.height())
        }

        #[inline]
        pub fn area(&self) -> f64 {
            self.width() * self.height()
        }

        /// 闭区间包含判断，边界上的点视为在内。
        #[inline]
        pub fn contains(&self, point: Point2) -> bool {
            point.x() >= self.min.x()
                && point.x() <= self.max.x()
                && point.y() >= self.min.y()
                && point.y() <= self.max.y()
        }

        /// 按给定边距向四周扩展。
        pub fn expanded(&self, margin: f64) -> Self {
            Self {
                min: Point2::new(self.min.x() - margin, self.min.y() - margin),
                max: Point2::new(self.max.x() + margin, self.max.y() + margin),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn bounds_from_points_orders_min_and_max() {
            let bounds = Bounds2D::from_points([
                Point2::new(10.0, -5.0),
                Point2::new(-3.0, 7.0),
                Point2::new(f64::NAN, 1.0),
            ])
            .expect("bounds");
            assert_eq!(bounds.min(), Point2::new(-3.0, -5.0));
            assert_eq!(bounds.max(), Point2::new(10.0, 7.0));
            assert!((bounds.larger_dimension() - 13.0).abs() < 1e-9);
            assert!(bounds.contains(Point2::new(10.0, 7.0)));
            assert!(!bounds.contains(Point2::new(10.1, 7.0)));
        }

        #[test]
        fn empty_point_set_has_no_bounds() {
            assert!(Bounds2D::from_points(std::iter::empty()).is_none());
            assert!(Bounds2D::empty().is_empty());
        }
    }
}

pub mod diagnostics {
    use std::collections::HashSet;

    /// 单次调用内的"只记录一次"集合，随流水线上下文传递，调用结束即丢弃。
    #[derive(Debug, Default)]
    pub struct LogOnce {
        seen: HashSet<String>,
    }

    impl LogOnce {
        pub fn new() -> Self {
            Self::default()
        }

        /// 首次见到 `key` 时返回 true。
        pub fn first(&mut self, key: impl Into<String>) -> bool {
            self.seen.insert(key.into())
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.seen.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.seen.is_empty()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn log_once_reports_first_sighting_only() {
            let mut once = LogOnce::new();
            assert!(once.first("3_TEXT"));
            assert!(!once.first("3_TEXT"));
            assert!(once.first("4_MTEXT"));
            assert_eq!(once.len(), 2);
        }
    }
}
