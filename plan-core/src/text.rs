//! 文字实体（TEXT/MTEXT/ATTDEF/ATTRIB）的内容与位置解析。
//!
//! 解析器交付的文字字段可能出现在多个别名上，优先级全部集中在 [`resolve_text`] 中。

use serde::{Deserialize, Serialize};

use crate::geometry::Point2;

/// 文字类实体的公共载荷。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point2>,
    #[serde(default)]
    pub height: f64,
    /// 旋转角（弧度）。
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "TextProbes::is_empty")]
    pub probes: TextProbes,
}

/// 解析器可能使用的备选字段。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextProbes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    /// 变换矩阵中的 X 轴分量 (xAxisX, xAxisY)，部分解析器把插入点写在这里。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<Point2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_point: Option<Point2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_point: Option<Point2>,
    /// 直接写在实体上的 x/y。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct: Option<Point2>,
}

impl TextProbes {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 位置坐标取自哪个字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    XAxis,
    InsertionPoint,
    Position,
    StartPoint,
    Direct,
    /// 其他字段都缺失或为 (0,0) 时退回矩阵字段，即使它本身是 (0,0)。
    XAxisFallback,
    Default,
}

impl CoordinateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateSource::XAxis => "x_axis",
            CoordinateSource::InsertionPoint => "insertion_point",
            CoordinateSource::Position => "position",
            CoordinateSource::StartPoint => "start_point",
            CoordinateSource::Direct => "direct",
            CoordinateSource::XAxisFallback => "x_axis_fallback",
            CoordinateSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedText {
    pub content: String,
    pub position: Point2,
    pub source: CoordinateSource,
}

/// 依次取 content、value、text_value、contents、string 中第一个去空白后非空的值。
pub fn resolve_content(text: &Text) -> Option<String> {
    let probes = &text.probes;
    std::iter::once(Some(text.content.as_str()))
        .chain([
            probes.value.as_deref(),
            probes.text_value.as_deref(),
            probes.contents.as_deref(),
            probes.string.as_deref(),
        ])
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
}

/// 取第一个非 (0,0) 的坐标；都不可用时退回矩阵字段，再退回原点。
pub fn resolve_position(text: &Text) -> (Point2, CoordinateSource) {
    let probes = &text.probes;
    let candidates = [
        (probes.x_axis, CoordinateSource::XAxis),
        (probes.insertion_point, CoordinateSource::InsertionPoint),
        (text.position, CoordinateSource::Position),
        (probes.start_point, CoordinateSource::StartPoint),
        (probes.direct, CoordinateSource::Direct),
    ];
    for (candidate, source) in candidates {
        if let Some(point) = candidate {
            if point.is_finite() && !point.is_origin() {
                return (point, source);
            }
        }
    }
    match probes.x_axis {
        Some(point) if point.is_finite() => (point, CoordinateSource::XAxisFallback),
        _ => (Point2::ORIGIN, CoordinateSource::Default),
    }
}

/// 内容为空（或只有空白）时返回 None，该文字不会被记录。
pub fn resolve_text(text: &Text) -> Option<ResolvedText> {
    let content = resolve_content(text)?;
    let (position, source) = resolve_position(text);
    Some(ResolvedText {
        content,
        position,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Text {
        Text {
            content: content.to_string(),
            ..Text::default()
        }
    }

    #[test]
    fn empty_or_blank_content_is_discarded() {
        assert!(resolve_text(&text("")).is_none());
        assert!(resolve_text(&text("   ")).is_none());
        let resolved = resolve_text(&text(" KITCHEN ")).expect("文字应被识别");
        assert_eq!(resolved.content, "KITCHEN");
    }

    #[test]
    fn content_falls_through_aliases_in_order() {
        let mut sample = text("");
        sample.probes.contents = Some("거실".into());
        sample.probes.string = Some("LIVING".into());
        assert_eq!(resolve_content(&sample).as_deref(), Some("거실"));

        sample.probes.value = Some("  ".into());
        sample.probes.text_value = Some("BATH".into());
        assert_eq!(resolve_content(&sample).as_deref(), Some("BATH"));
    }

    #[test]
    fn position_skips_origin_placeholders() {
        let mut sample = text("ROOM");
        sample.probes.x_axis = Some(Point2::ORIGIN);
        sample.probes.insertion_point = Some(Point2::ORIGIN);
        sample.position = Some(Point2::new(10.0, 20.0));
        sample.probes.direct = Some(Point2::new(99.0, 99.0));
        let (point, source) = resolve_position(&sample);
        assert_eq!(point, Point2::new(10.0, 20.0));
        assert_eq!(source, CoordinateSource::Position);
    }

    #[test]
    fn matrix_field_wins_when_present() {
        let mut sample = text("ROOM");
        sample.probes.x_axis = Some(Point2::new(5.0, 6.0));
        sample.position = Some(Point2::new(10.0, 20.0));
        assert_eq!(resolve_position(&sample).1, CoordinateSource::XAxis);
    }

    #[test]
    fn position_fallbacks() {
        let mut sample = text("ROOM");
        sample.probes.x_axis = Some(Point2::ORIGIN);
        assert_eq!(
            resolve_position(&sample),
            (Point2::ORIGIN, CoordinateSource::XAxisFallback)
        );
        sample.probes.x_axis = None;
        assert_eq!(
            resolve_position(&sample),
            (Point2::ORIGIN, CoordinateSource::Default)
        );
    }
}
