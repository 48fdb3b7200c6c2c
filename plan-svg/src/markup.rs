//! SVG 文本层面的处理：路径输出、墙体重着色、视窗收紧、样式合并与清理。

use std::collections::HashSet;

use once_cell::sync::Lazy;
use plan_config::ComposerConfig;
use plan_core::geometry::{Bounds2D, Point2};
use regex::Regex;

use crate::{SvgError, fmt_num};

static VIEW_BOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"viewBox="([^"]*)""#).expect("viewBox pattern"));
static PATH_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sd="([^"]*)""#).expect("path data pattern"));
static PATH_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ML]\s*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)[\s,]+(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)")
        .expect("path point pattern")
});
static TEXT_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<text\b[^>]*?\sx="(-?[\d.eE+-]+)"\s+y="(-?[\d.eE+-]+)""#)
        .expect("text anchor pattern")
});
static RECT_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"<rect\b[^>]*?\sx="(-?[\d.eE+-]+)"\s+y="(-?[\d.eE+-]+)""#,
        r#"\s+width="([\d.eE+-]+)"\s+height="([\d.eE+-]+)""#,
    ))
    .expect("rect pattern")
});
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<style[^>]*>(.*?)</style>\s*").expect("style pattern"));
static SVG_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<svg\b[^>]*>").expect("svg pattern"));
static EMPTY_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<g\b[^>]*>\s*</g>").expect("empty group pattern"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank pattern"));
static DRAWABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:path|line|polyline|polygon|circle|ellipse|rect|text)\b")
        .expect("drawable pattern")
});
static WALL_STROKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"stroke="(?:yellow|Yellow|#FFFF00|#ffff00"#,
        r"|rgb\(\s*255\s*,\s*255\s*,\s*0\s*\)",
        r"|rgb\(\s*65\s*,\s*65\s*,\s*65\s*\)",
        r"|rgb\(\s*128\s*,\s*128\s*,\s*128\s*\)",
        r"|rgb\(\s*169\s*,\s*169\s*,\s*169\s*\)",
        r"|rgb\(\s*211\s*,\s*211\s*,\s*211\s*\)",
        r#"|(?i:#808080|#A9A9A9|#D3D3D3|#696969))""#,
    ))
    .expect("wall stroke pattern")
});
static WALL_FILL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"fill="(?:yellow|Yellow|#FFFF00|#ffff00"#,
        r"|rgb\(\s*255\s*,\s*255\s*,\s*0\s*\)",
        r"|rgb\(\s*65\s*,\s*65\s*,\s*65\s*\)",
        r#"|(?i:#808080))""#,
    ))
    .expect("wall fill pattern")
});

/// 世界坐标 y 向上，SVG 坐标 y 向下。
#[inline]
pub fn svg_y(y: f64) -> f64 {
    -y
}

/// 将世界坐标点列输出为 `M x y L x y ...` 路径数据。
pub fn path_data(points: &[Point2], closed: bool) -> String {
    let mut data = String::new();
    for (index, point) in points.iter().enumerate() {
        if index > 0 {
            data.push(' ');
        }
        data.push_str(if index == 0 { "M " } else { "L " });
        data.push_str(&fmt_num(point.x()));
        data.push(' ');
        data.push_str(&fmt_num(svg_y(point.y())));
    }
    if closed && !data.is_empty() {
        data.push_str(" Z");
    }
    data
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    /// 由世界坐标范围得到 SVG 视窗（翻转 y 轴，尺寸至少为 1）。
    pub fn from_world(bounds: &Bounds2D) -> Self {
        Self {
            min_x: bounds.min().x(),
            min_y: svg_y(bounds.max().y()),
            width: bounds.width().max(1.0),
            height: bounds.height().max(1.0),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let values: Vec<f64> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [min_x, min_y, width, height] => Some(Self {
                min_x: *min_x,
                min_y: *min_y,
                width: *width,
                height: *height,
            }),
            _ => None,
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn to_attr(&self) -> String {
        format!(
            "{} {} {} {}",
            fmt_num(self.min_x),
            fmt_num(self.min_y),
            fmt_num(self.width),
            fmt_num(self.height)
        )
    }
}

pub fn current_view_box(svg: &str) -> Option<ViewBox> {
    VIEW_BOX
        .captures(svg)
        .and_then(|caps| caps.get(1))
        .and_then(|value| ViewBox::parse(value.as_str()))
}

/// 将旧调色板（黄色与灰色系）的描边/填充替换为墙体颜色，返回替换次数。
pub fn recolor_walls(svg: &str, color: &str) -> (String, usize) {
    let strokes = WALL_STROKE.find_iter(svg).count();
    let stroke_replacement = format!("stroke=\"{color}\"");
    let recolored = WALL_STROKE.replace_all(svg, stroke_replacement.as_str());
    let fills = WALL_FILL.find_iter(&recolored).count();
    let fill_replacement = format!("fill=\"{color}\"");
    let recolored = WALL_FILL.replace_all(&recolored, fill_replacement.as_str());
    (recolored.into_owned(), strokes + fills)
}

/// 收集所有路径数据中 M/L 命令后的坐标（SVG 空间）。
pub fn sample_path_points(svg: &str) -> Vec<(f64, f64)> {
    let mut samples = Vec::new();
    for data in PATH_DATA.captures_iter(svg) {
        let Some(data) = data.get(1) else {
            continue;
        };
        for caps in PATH_POINT.captures_iter(data.as_str()) {
            let x = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let y = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            if let (Some(x), Some(y)) = (x, y) {
                if x.is_finite() && y.is_finite() {
                    samples.push((x, y));
                }
            }
        }
    }
    samples
}

/// 文字锚点与矩形四角。标注与门洞标记必须留在视窗内。
pub fn sample_annotation_points(svg: &str) -> Vec<(f64, f64)> {
    let number = |caps: &regex::Captures<'_>, index: usize| {
        caps.get(index)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    };
    let mut samples = Vec::new();
    for caps in TEXT_ANCHOR.captures_iter(svg) {
        if let (Some(x), Some(y)) = (number(&caps, 1), number(&caps, 2)) {
            samples.push((x, y));
        }
    }
    for caps in RECT_BOX.captures_iter(svg) {
        let corner = (number(&caps, 1), number(&caps, 2));
        let size = (number(&caps, 3), number(&caps, 4));
        if let ((Some(x), Some(y)), (Some(width), Some(height))) = (corner, size) {
            samples.push((x, y));
            samples.push((x + width, y + height));
        }
    }
    samples
}

/// 依据路径、文字与标记采样收紧视窗。采样不足或新视窗面积超过当前的上限倍数时保持原样。
pub fn tighten_view_box(svg: &str, config: &ComposerConfig) -> (String, bool) {
    let mut samples = sample_path_points(svg);
    samples.extend(sample_annotation_points(svg));
    if samples.len() < config.view_min_samples {
        return (svg.to_string(), false);
    }
    let Some(current) = current_view_box(svg) else {
        return (svg.to_string(), false);
    };
    let Some(extent) = Bounds2D::from_points(samples.iter().map(|(x, y)| Point2::new(*x, *y)))
    else {
        return (svg.to_string(), false);
    };

    let margin = (extent.width() * config.view_margin_ratio)
        .max(extent.height() * config.view_margin_ratio)
        .max(config.view_min_margin);
    let padded = extent.expanded(margin);
    let candidate = ViewBox {
        min_x: padded.min().x(),
        min_y: padded.min().y(),
        width: padded.width(),
        height: padded.height(),
    };
    if candidate.area() > current.area() * config.view_max_growth {
        return (svg.to_string(), false);
    }
    let replacement = format!("viewBox=\"{}\"", candidate.to_attr());
    (
        VIEW_BOX.replace(svg, replacement.as_str()).into_owned(),
        true,
    )
}

/// 合并全部 `<style>` 块并按规则去重，放在 `<svg>` 开始标签之后。
pub fn merge_styles(svg: &str, extra_css: &str) -> Result<String, SvgError> {
    let mut seen = HashSet::new();
    let mut rules = Vec::new();
    let bodies = STYLE_BLOCK
        .captures_iter(svg)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .chain(std::iter::once(extra_css.to_string()));
    for body in bodies {
        for rule in body.split('}') {
            let normalized = rule.split_whitespace().collect::<Vec<_>>().join(" ");
            if normalized.is_empty() {
                continue;
            }
            if seen.insert(normalized.clone()) {
                rules.push(format!("{normalized} }}"));
            }
        }
    }

    let stripped = STYLE_BLOCK.replace_all(svg, "");
    let open = SVG_OPEN
        .find(&stripped)
        .ok_or_else(|| SvgError::Malformed("missing <svg> element".to_string()))?;
    let mut merged = String::with_capacity(stripped.len() + 256);
    merged.push_str(&stripped[..open.end()]);
    merged.push_str("\n<style>\n");
    for rule in &rules {
        merged.push_str(rule);
        merged.push('\n');
    }
    merged.push_str("</style>\n");
    merged.push_str(&stripped[open.end()..]);
    Ok(merged)
}

/// 反复删除空的 `<g>`，直到没有可删除的为止。
pub fn remove_empty_groups(svg: &str) -> String {
    let mut current = svg.to_string();
    loop {
        let next = EMPTY_GROUP.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn collapse_blank_lines(svg: &str) -> String {
    BLANK_LINES.replace_all(svg, "\n").into_owned()
}

pub fn count_drawables(svg: &str) -> usize {
    DRAWABLE.find_iter(svg).count()
}

/// 在最后一个 `</svg>` 之前插入片段。
pub fn insert_before_close(svg: &str, fragment: &str) -> Result<String, SvgError> {
    let close = svg
        .rfind("</svg>")
        .ok_or_else(|| SvgError::Malformed("missing </svg> closing tag".to_string()))?;
    let mut out = String::with_capacity(svg.len() + fragment.len());
    out.push_str(&svg[..close]);
    out.push_str(fragment);
    out.push_str(&svg[close..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_data_flips_y_and_closes() {
        let data = path_data(&[Point2::new(0.0, 10.0), Point2::new(5.5, -2.0)], true);
        assert_eq!(data, "M 0 -10 L 5.5 2 Z");
    }

    #[test]
    fn recolor_covers_legacy_palette() {
        let svg = r##"<path stroke="rgb(255, 255, 0)" fill="#808080"/><path stroke="#a9a9a9"/><path stroke="rgb(255,0,0)"/>"##;
        let (out, count) = recolor_walls(svg, "#006400");
        assert_eq!(count, 3);
        assert_eq!(out.matches("#006400").count(), 3);
        assert!(out.contains(r#"stroke="rgb(255,0,0)""#));
    }

    #[test]
    fn view_box_needs_enough_samples() {
        let config = ComposerConfig::default();
        let svg = r#"<svg viewBox="0 0 1000 1000"><path d="M 10 10 L 20 20"/></svg>"#;
        let (out, adjusted) = tighten_view_box(svg, &config);
        assert!(!adjusted);
        assert_eq!(out, svg);
    }

    #[test]
    fn view_box_is_tightened_with_minimum_margin() {
        let config = ComposerConfig::default();
        let mut svg = String::from(r#"<svg viewBox="-5000 -5000 10000 10000">"#);
        for i in 0..10 {
            svg.push_str(&format!(r#"<path d="M {} 0 L {} 100"/>"#, i * 10, i * 10));
        }
        svg.push_str("</svg>");
        let (out, adjusted) = tighten_view_box(&svg, &config);
        assert!(adjusted);
        let view = current_view_box(&out).expect("viewBox");
        assert_eq!(view, ViewBox {
            min_x: -50.0,
            min_y: -50.0,
            width: 190.0,
            height: 200.0,
        });
    }

    #[test]
    fn tightened_view_box_keeps_labels_and_markers() {
        let config = ComposerConfig::default();
        let mut svg = String::from(r#"<svg viewBox="-5000 -8000 12000 12000">"#);
        for i in 0..10 {
            svg.push_str(&format!(r#"<path d="M {} 0 L {} -100"/>"#, i * 10, i * 10));
        }
        svg.push_str(r#"<g class="text-label"><text x="50" y="-600" font-size="120">LIVING</text></g>"#);
        svg.push_str(r#"<rect x="300" y="-50" width="240" height="240" stroke="red"/>"#);
        svg.push_str("</svg>");
        let (out, adjusted) = tighten_view_box(&svg, &config);
        assert!(adjusted);
        let view = current_view_box(&out).expect("viewBox");
        assert!(view.min_y <= -600.0, "label cropped: {view:?}");
        assert!(view.min_x + view.width >= 540.0, "marker cropped: {view:?}");
        assert!(view.min_y + view.height >= 190.0, "marker cropped: {view:?}");
    }

    #[test]
    fn annotation_points_cover_text_and_rect_corners() {
        let svg = r#"<text class="mtext-custom" x="1" y="-2" font-size="3"><tspan x="9" dy="4">a</tspan></text><rect x="10" y="20" width="5" height="6"/>"#;
        assert_eq!(
            sample_annotation_points(svg),
            vec![(1.0, -2.0), (10.0, 20.0), (15.0, 26.0)]
        );
    }

    #[test]
    fn oversized_candidate_keeps_current_view_box() {
        let config = ComposerConfig::default();
        let mut svg = String::from(r#"<svg viewBox="0 0 10 10">"#);
        for i in 0..12 {
            svg.push_str(&format!(r#"<path d="M {} 0 L {} 1000"/>"#, i * 100, i * 100));
        }
        svg.push_str("</svg>");
        let (_, adjusted) = tighten_view_box(&svg, &config);
        assert!(!adjusted);
    }

    #[test]
    fn styles_are_merged_once() {
        let svg = "<svg viewBox=\"0 0 1 1\"><style>.a { fill: none; }</style><g></g><style>.a {  fill: none; }\n.b { stroke: red; }</style></svg>";
        let merged = merge_styles(svg, ".c { stroke: blue; }").expect("merge");
        assert_eq!(merged.matches("<style>").count(), 1);
        assert_eq!(merged.matches(".a { fill: none; }").count(), 1);
        assert!(merged.contains(".b { stroke: red; }"));
        assert!(merged.contains(".c { stroke: blue; }"));
        let cleaned = remove_empty_groups(&merged);
        assert!(!cleaned.contains("<g></g>"));
    }

    #[test]
    fn nested_empty_groups_are_removed() {
        let svg = "<svg><g id=\"a\">\n  <g id=\"b\">\n\n  </g>\n</g><path d=\"M 0 0\"/></svg>";
        let cleaned = collapse_blank_lines(&remove_empty_groups(svg));
        assert_eq!(cleaned, "<svg><path d=\"M 0 0\"/></svg>");
        assert_eq!(count_drawables(&cleaned), 1);
    }
}
