//! 自定义叠加层：多行文字、填充、尺寸标注与块参照。

use once_cell::sync::Lazy;
use plan_config::ComposerConfig;
use plan_core::entity::{BlockTable, Dimension, Entity, Hatch, Insert, Primitive};
use plan_core::text::{Text, resolve_content, resolve_position};
use plan_core::transform::apply_point;
use regex::Regex;
use tracing::debug;

use crate::color::aci_to_css;
use crate::markup::{ViewBox, path_data, svg_y};
use crate::{SvgError, escape_xml, fmt_num};

static PARAGRAPH_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\p[^;\\]*;").expect("paragraph code pattern"));
static FORMAT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[A-OQ-Za-oq-z][^\\;]*;").expect("format code pattern"));

pub(crate) const OVERLAY_CSS: &str = "\
.mtext-custom { font-family: Arial, sans-serif; fill: #000000; }
.hatch-custom { stroke-width: 0.5; }
.dimension-line { stroke: #0000FF; fill: none; }
.dimension-text { fill: #0000FF; font-family: Arial, sans-serif; text-anchor: middle; }
.insert-text { font-family: Arial, sans-serif; }
.door-marker text { font-weight: bold; font-family: Arial, sans-serif; }
.text-label text { font-family: Arial, sans-serif; }
";

pub(crate) const HATCH_DEFS: &str = "\
<defs>
<pattern id=\"ansi31-pattern\" patternUnits=\"userSpaceOnUse\" width=\"10\" height=\"10\">
<line x1=\"0\" y1=\"10\" x2=\"10\" y2=\"0\" stroke=\"rgba(120,120,120,0.8)\" stroke-width=\"1\"/>
</pattern>
<pattern id=\"ansi32-pattern\" patternUnits=\"userSpaceOnUse\" width=\"10\" height=\"10\">
<line x1=\"0\" y1=\"10\" x2=\"10\" y2=\"0\" stroke=\"rgba(120,120,120,0.8)\" stroke-width=\"1\"/>
<line x1=\"0\" y1=\"0\" x2=\"10\" y2=\"10\" stroke=\"rgba(120,120,120,0.8)\" stroke-width=\"1\"/>
</pattern>
</defs>
";

/// 去掉 MTEXT 的段落与格式控制码，`\P` 转为换行。
pub fn clean_mtext(raw: &str) -> String {
    let without_paragraph = PARAGRAPH_CODE.replace_all(raw, "");
    let with_breaks = without_paragraph.replace("\\P", "\n");
    let plain = FORMAT_CODE.replace_all(&with_breaks, "");
    plain.replace(['{', '}'], "")
}

/// 叠加层渲染上下文。
pub(crate) struct OverlayContext<'a> {
    pub config: &'a ComposerConfig,
    pub blocks: &'a BlockTable,
    pub view: ViewBox,
}

/// 单个叠加实体的渲染结果统计。
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct OverlayCounts {
    pub mtext: usize,
    pub hatch: usize,
    pub dimension: usize,
    pub insert: usize,
}

fn overlay_error(kind: &'static str, id: u64, message: impl Into<String>) -> SvgError {
    SvgError::Overlay {
        kind,
        id,
        message: message.into(),
    }
}

impl OverlayContext<'_> {
    pub fn render_mtext(&self, id: u64, entity: &Entity, text: &Text) -> Result<String, SvgError> {
        let raw = resolve_content(text).ok_or_else(|| overlay_error("MTEXT", id, "empty content"))?;
        let cleaned = clean_mtext(&raw);
        let lines: Vec<&str> = cleaned
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(overlay_error("MTEXT", id, "no visible lines after cleaning"));
        }

        let (local, _) = resolve_position(text);
        let anchor = apply_point(local, &entity.transforms);
        if !anchor.is_finite() {
            return Err(overlay_error("MTEXT", id, "anchor is not finite"));
        }
        let font_size = (text.height * self.config.mtext_height_ratio)
            .max(self.view.width.min(self.view.height) * self.config.mtext_min_font_ratio);
        let x = fmt_num(anchor.x());
        let y = fmt_num(svg_y(anchor.y()));

        let mut out = format!(
            "<text class=\"mtext-custom\" x=\"{x}\" y=\"{y}\" font-size=\"{}\"",
            fmt_num(font_size)
        );
        if text.rotation != 0.0 {
            out.push_str(&format!(
                " transform=\"rotate({} {x} {y})\"",
                fmt_num(-text.rotation.to_degrees())
            ));
        }
        out.push('>');
        for (index, line) in lines.iter().enumerate() {
            let dy = if index == 0 {
                0.0
            } else {
                font_size * self.config.line_spacing
            };
            out.push_str(&format!(
                "<tspan x=\"{x}\" dy=\"{}\">{}</tspan>",
                fmt_num(dy),
                escape_xml(line)
            ));
        }
        out.push_str("</text>\n");
        Ok(out)
    }

    pub fn render_hatch(
        &self,
        id: u64,
        entity: &Entity,
        hatch: &Hatch,
    ) -> Result<String, SvgError> {
        let fill = hatch_fill(hatch);
        let mut out = String::new();
        for boundary in &hatch.boundaries {
            if boundary.vertices.len() < 3 {
                continue;
            }
            let points: Vec<_> = boundary
                .vertices
                .iter()
                .map(|vertex| apply_point(*vertex, &entity.transforms))
                .collect();
            out.push_str(&format!(
                "<path class=\"hatch-custom\" d=\"{}\" fill=\"{fill}\" stroke=\"rgba(150,150,150,0.8)\"/>\n",
                path_data(&points, true)
            ));
        }
        if out.is_empty() {
            return Err(overlay_error("HATCH", id, "no boundary path with at least 3 vertices"));
        }
        Ok(out)
    }

    pub fn render_dimension(
        &self,
        id: u64,
        entity: &Entity,
        dimension: &Dimension,
    ) -> Result<String, SvgError> {
        let start = apply_point(dimension.definition_point, &entity.transforms);
        let end = apply_point(
            dimension
                .dimension_line_point
                .unwrap_or(dimension.text_midpoint),
            &entity.transforms,
        );
        let label_at = apply_point(dimension.text_midpoint, &entity.transforms);
        if !(start.is_finite() && end.is_finite() && label_at.is_finite()) {
            return Err(overlay_error("DIMENSION", id, "dimension points are not finite"));
        }

        let mut out = String::from("<g class=\"dimension\">");
        out.push_str(&format!(
            "<path class=\"dimension-line\" d=\"{}\"/>",
            path_data(&[start, end], false)
        ));
        let label = dimension
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty() && *text != "<>")
            .map(str::to_string)
            .or_else(|| {
                dimension
                    .measurement
                    .filter(|value| value.is_finite())
                    .map(|value| format!("{value:.0}"))
            });
        if let Some(label) = label {
            let font_size =
                self.view.width.min(self.view.height) * self.config.mtext_min_font_ratio;
            out.push_str(&format!(
                "<text class=\"dimension-text\" x=\"{}\" y=\"{}\" font-size=\"{}\">{}</text>",
                fmt_num(label_at.x()),
                fmt_num(svg_y(label_at.y())),
                fmt_num(font_size),
                escape_xml(&label)
            ));
        }
        out.push_str("</g>\n");
        Ok(out)
    }

    /// 块参照：展开后的块内实体逐一输出，嵌套参照受深度限制。
    pub fn render_insert(
        &self,
        id: u64,
        entity: &Entity,
        insert: &Insert,
        depth: usize,
        counts: &mut OverlayCounts,
    ) -> Result<String, SvgError> {
        if insert.entities.is_empty() && !self.blocks.contains_key(&insert.block_name) {
            return Err(SvgError::UnknownBlock(insert.block_name.clone()));
        }
        let mut body = String::new();
        for child in entity.expand(self.blocks) {
            match self.render_block_child(id, &child, depth, counts) {
                Ok(fragment) => body.push_str(&fragment),
                Err(err) => debug!(block = %insert.block_name, error = %err, "块内实体渲染失败，已跳过"),
            }
        }
        Ok(format!(
            "<g class=\"insert-block\" data-block=\"{}\">\n{body}</g>\n",
            escape_xml(&insert.block_name)
        ))
    }

    fn render_block_child(
        &self,
        id: u64,
        child: &Entity,
        depth: usize,
        counts: &mut OverlayCounts,
    ) -> Result<String, SvgError> {
        match &child.primitive {
            Primitive::Line(_)
            | Primitive::Polyline(_)
            | Primitive::Arc(_)
            | Primitive::Circle(_) => {
                let stroke = aci_to_css(child.color);
                let mut out = String::new();
                for path in child.projection(self.blocks) {
                    if path.points.len() >= 2 {
                        out.push_str(&format!(
                            "<path d=\"{}\" stroke=\"{stroke}\" fill=\"none\"/>\n",
                            path_data(&path.points, path.closed)
                        ));
                    }
                }
                Ok(out)
            }
            Primitive::Insert(nested) => {
                if depth + 1 >= self.config.max_insert_depth {
                    debug!(block = %nested.block_name, depth, "块参照嵌套过深，停止展开");
                    return Ok(String::new());
                }
                let fragment = self.render_insert(id, child, nested, depth + 1, counts)?;
                counts.insert += 1;
                Ok(fragment)
            }
            Primitive::MText(text) => {
                let fragment = self.render_mtext(id, child, text)?;
                counts.mtext += 1;
                Ok(fragment)
            }
            Primitive::Hatch(hatch) => {
                let fragment = self.render_hatch(id, child, hatch)?;
                counts.hatch += 1;
                Ok(fragment)
            }
            Primitive::Dimension(dimension) => {
                let fragment = self.render_dimension(id, child, dimension)?;
                counts.dimension += 1;
                Ok(fragment)
            }
            Primitive::Text(text) | Primitive::Attrib(text) => {
                let Some(content) = resolve_content(text) else {
                    return Ok(String::new());
                };
                let anchor = apply_point(resolve_position(text).0, &child.transforms);
                let font_size = if text.height > 0.0 {
                    text.height
                } else {
                    self.config.label_font_size
                };
                Ok(format!(
                    "<text class=\"insert-text\" x=\"{}\" y=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>\n",
                    fmt_num(anchor.x()),
                    fmt_num(svg_y(anchor.y())),
                    fmt_num(font_size),
                    aci_to_css(child.color),
                    escape_xml(&content)
                ))
            }
            Primitive::Attdef(_) | Primitive::Point(_) => Ok(String::new()),
        }
    }
}

fn hatch_fill(hatch: &Hatch) -> &'static str {
    if hatch.solid || hatch.pattern_name.eq_ignore_ascii_case("solid") {
        return "rgba(180,180,180,0.5)";
    }
    match hatch.pattern_name.to_ascii_lowercase().as_str() {
        "ansi31" => "url(#ansi31-pattern)",
        "ansi32" => "url(#ansi32-pattern)",
        _ => "rgba(200,200,200,0.3)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_core::entity::{BoundaryPath, Line};
    use plan_core::geometry::{Point2, Vector2};

    fn context<'a>(config: &'a ComposerConfig, blocks: &'a BlockTable) -> OverlayContext<'a> {
        OverlayContext {
            config,
            blocks,
            view: ViewBox {
                min_x: 0.0,
                min_y: -1000.0,
                width: 1000.0,
                height: 1000.0,
            },
        }
    }

    #[test]
    fn mtext_codes_are_stripped() {
        assert_eq!(clean_mtext("\\pxqc;거실\\P{\\fArial|b1;LIVING}"), "거실\nLIVING");
        assert_eq!(clean_mtext("plain"), "plain");
    }

    #[test]
    fn mtext_lines_use_font_size_step() {
        let config = ComposerConfig::default();
        let blocks = BlockTable::new();
        let text = Text {
            content: "A\\PB".into(),
            position: Some(Point2::new(100.0, 200.0)),
            height: 250.0,
            ..Text::default()
        };
        let entity = Entity::new("TEXT", Primitive::MText(text.clone()));
        let out = context(&config, &blocks)
            .render_mtext(0, &entity, &text)
            .expect("mtext");
        assert!(out.contains("x=\"100\" y=\"-200\" font-size=\"200\""));
        assert!(out.contains("dy=\"240\">B</tspan>"));
    }

    #[test]
    fn empty_mtext_is_an_overlay_error() {
        let config = ComposerConfig::default();
        let blocks = BlockTable::new();
        let text = Text {
            content: "\\pxqc;".into(),
            ..Text::default()
        };
        let entity = Entity::new("TEXT", Primitive::MText(text.clone()));
        let err = context(&config, &blocks)
            .render_mtext(7, &entity, &text)
            .expect_err("should fail");
        assert!(matches!(err, SvgError::Overlay { id: 7, .. }));
    }

    #[test]
    fn hatch_fill_follows_pattern() {
        let config = ComposerConfig::default();
        let blocks = BlockTable::new();
        let hatch = Hatch {
            pattern_name: "ANSI31".into(),
            solid: false,
            boundaries: vec![BoundaryPath {
                vertices: vec![
                    Point2::new(0.0, 0.0),
                    Point2::new(10.0, 0.0),
                    Point2::new(10.0, 10.0),
                ],
            }],
        };
        let entity = Entity::new("HATCH", Primitive::Hatch(hatch.clone()));
        let out = context(&config, &blocks)
            .render_hatch(0, &entity, &hatch)
            .expect("hatch");
        assert!(out.contains("fill=\"url(#ansi31-pattern)\""));
        assert!(out.ends_with("Z\" fill=\"url(#ansi31-pattern)\" stroke=\"rgba(150,150,150,0.8)\"/>\n"));
    }

    #[test]
    fn dimension_label_falls_back_to_measurement() {
        let config = ComposerConfig::default();
        let blocks = BlockTable::new();
        let dimension = Dimension {
            definition_point: Point2::new(0.0, 0.0),
            text_midpoint: Point2::new(500.0, 100.0),
            measurement: Some(1234.56),
            text: Some("<>".into()),
            dimension_line_point: Some(Point2::new(1000.0, 0.0)),
        };
        let entity = Entity::new("DIM", Primitive::Dimension(dimension.clone()));
        let out = context(&config, &blocks)
            .render_dimension(0, &entity, &dimension)
            .expect("dimension");
        assert!(out.contains("d=\"M 0 0 L 1000 0\""));
        assert!(out.contains(">1235</text>"));
    }

    #[test]
    fn unknown_block_is_reported() {
        let config = ComposerConfig::default();
        let blocks = BlockTable::new();
        let insert = Insert {
            block_name: "MISSING".into(),
            position: Point2::ORIGIN,
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
            entities: Vec::new(),
        };
        let entity = Entity::new("0", Primitive::Insert(insert.clone()));
        let mut counts = OverlayCounts::default();
        let err = context(&config, &blocks)
            .render_insert(0, &entity, &insert, 0, &mut counts)
            .expect_err("unknown block");
        assert!(matches!(err, SvgError::UnknownBlock(ref name) if name == "MISSING"));
    }

    #[test]
    fn insert_replays_block_through_placement() {
        let config = ComposerConfig::default();
        let mut blocks = BlockTable::new();
        blocks.insert(
            "BOX".into(),
            vec![Entity::new(
                "0",
                Primitive::Line(Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(10.0, 0.0),
                }),
            )],
        );
        let insert = Insert {
            block_name: "BOX".into(),
            position: Point2::new(100.0, 100.0),
            scale: Vector2::new(2.0, 2.0),
            rotation: 0.0,
            entities: Vec::new(),
        };
        let entity = Entity::new("FURN", Primitive::Insert(insert.clone()));
        let mut counts = OverlayCounts::default();
        let out = context(&config, &blocks)
            .render_insert(0, &entity, &insert, 0, &mut counts)
            .expect("insert");
        assert!(out.starts_with("<g class=\"insert-block\" data-block=\"BOX\">"));
        assert!(out.contains("d=\"M 100 -100 L 120 -100\""));
    }
}
