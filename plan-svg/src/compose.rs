//! 合成：底图骨架 + 重着色 + 叠加层 + 门标记 + 文字标签 + 视窗收紧 + 样式整理。

use plan_config::ComposerConfig;
use plan_core::annotation::{DoorCandidate, DoorKind, TextLabel};
use plan_core::diagnostics::LogOnce;
use plan_core::entity::{Drawing, EntityType, Primitive};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::markup::{
    self, ViewBox, collapse_blank_lines, count_drawables, insert_before_close, merge_styles,
    remove_empty_groups, svg_y, tighten_view_box,
};
use crate::overlay::{HATCH_DEFS, OVERLAY_CSS, OverlayContext, OverlayCounts};
use crate::{BaseRenderer, SvgError, escape_xml, fmt_num};

/// 合成阶段的计数。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComposeReport {
    pub mtext: usize,
    pub hatch: usize,
    pub dimension: usize,
    pub insert: usize,
    pub skipped: usize,
    pub doors: usize,
    pub labels: usize,
    pub recolored: usize,
    pub view_box_adjusted: bool,
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub document: String,
    pub report: ComposeReport,
}

pub struct Composer<'a> {
    config: &'a ComposerConfig,
    renderer: &'a dyn BaseRenderer,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a ComposerConfig, renderer: &'a dyn BaseRenderer) -> Self {
        Self { config, renderer }
    }

    pub fn compose(
        &self,
        drawing: &Drawing,
        doors: &[DoorCandidate],
        labels: &[TextLabel],
        log: &mut LogOnce,
    ) -> Result<Composition, SvgError> {
        let mut report = ComposeReport::default();
        let mut svg = self.renderer.render(drawing)?;
        let view = markup::current_view_box(&svg)
            .ok_or_else(|| SvgError::Malformed("skeleton has no viewBox".to_string()))?;

        if self.config.recolor_walls {
            let (recolored, count) = markup::recolor_walls(&svg, &self.config.wall_color);
            svg = recolored;
            report.recolored = count;
        }

        let overlays = self.render_overlays(drawing, view, &mut report, log);
        let markers = self.render_door_markers(doors);
        let texts = self.render_text_labels(labels);
        report.doors = doors.len();
        report.labels = texts.1;

        let mut fragment = String::new();
        if report.hatch > 0 {
            fragment.push_str(HATCH_DEFS);
        }
        fragment.push_str("<g id=\"custom-overlays\">\n");
        fragment.push_str(&overlays);
        fragment.push_str("</g>\n<g id=\"door-markers\">\n");
        fragment.push_str(&markers);
        fragment.push_str("</g>\n<g id=\"text-labels\">\n");
        fragment.push_str(&texts.0);
        fragment.push_str("</g>\n");
        svg = insert_before_close(&svg, &fragment)?;

        let (tightened, adjusted) = tighten_view_box(&svg, self.config);
        report.view_box_adjusted = adjusted;
        let merged = merge_styles(&tightened, OVERLAY_CSS)?;
        let document = collapse_blank_lines(&remove_empty_groups(&merged));

        let drawables = count_drawables(&document);
        if drawables == 0 {
            return Err(SvgError::Empty);
        }
        info!(
            drawables,
            mtext = report.mtext,
            hatch = report.hatch,
            dimension = report.dimension,
            insert = report.insert,
            skipped = report.skipped,
            doors = report.doors,
            labels = report.labels,
            "文档合成完成"
        );
        Ok(Composition { document, report })
    }

    fn render_overlays(
        &self,
        drawing: &Drawing,
        view: ViewBox,
        report: &mut ComposeReport,
        log: &mut LogOnce,
    ) -> String {
        let context = OverlayContext {
            config: self.config,
            blocks: drawing.blocks(),
            view,
        };
        let mut counts = OverlayCounts::default();
        let mut out = String::new();
        for (id, entity) in drawing.entities() {
            let id = id.get();
            let rendered = match &entity.primitive {
                Primitive::MText(text) => context
                    .render_mtext(id, entity, text)
                    .map(|fragment| (fragment, EntityType::MText)),
                Primitive::Hatch(hatch) => context
                    .render_hatch(id, entity, hatch)
                    .map(|fragment| (fragment, EntityType::Hatch)),
                Primitive::Dimension(dimension) => context
                    .render_dimension(id, entity, dimension)
                    .map(|fragment| (fragment, EntityType::Dimension)),
                Primitive::Insert(insert) => context
                    .render_insert(id, entity, insert, 0, &mut counts)
                    .map(|fragment| (fragment, EntityType::Insert)),
                _ => continue,
            };
            match rendered {
                Ok((fragment, kind)) => {
                    match kind {
                        EntityType::MText => counts.mtext += 1,
                        EntityType::Hatch => counts.hatch += 1,
                        EntityType::Dimension => counts.dimension += 1,
                        _ => counts.insert += 1,
                    }
                    out.push_str(&fragment);
                }
                Err(err) => {
                    report.skipped += 1;
                    let key = format!("overlay_{}_{}", entity.entity_type().as_str(), err);
                    if log.first(key) {
                        warn!(entity = id, layer = %entity.layer, error = %err, "叠加层渲染失败，已跳过");
                    } else {
                        debug!(entity = id, error = %err, "叠加层渲染失败，已跳过");
                    }
                }
            }
        }
        report.mtext = counts.mtext;
        report.hatch = counts.hatch;
        report.dimension = counts.dimension;
        report.insert = counts.insert;
        out
    }

    fn marker_size(&self, door: &DoorCandidate) -> f64 {
        match (door.kind, door.radius) {
            (DoorKind::ArcDoor, Some(radius)) => radius * self.config.door_marker_ratio,
            (DoorKind::InsertDoor, _) => self.config.insert_marker_size,
            _ => self.config.door_marker_size,
        }
    }

    fn render_door_markers(&self, doors: &[DoorCandidate]) -> String {
        let mut out = String::new();
        for (index, door) in doors.iter().enumerate() {
            let number = index + 1;
            let size = self.marker_size(door);
            let x = door.marker.x();
            let y = svg_y(door.marker.y());
            out.push_str(&format!(
                "<g class=\"door-marker\" id=\"door_{number}\" data-kind=\"{}\">",
                door.kind.as_str()
            ));
            out.push_str(&format!(
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" stroke=\"{}\" stroke-width=\"{}\" fill=\"{}\"/>",
                fmt_num(x - size / 2.0),
                fmt_num(y - size / 2.0),
                fmt_num(size),
                fmt_num(size),
                self.config.door_stroke,
                fmt_num(self.config.door_stroke_width),
                self.config.door_fill
            ));
            out.push_str(&format!(
                "<text x=\"{}\" y=\"{}\" font-size=\"{}\" fill=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}{number}</text>",
                fmt_num(x),
                fmt_num(y),
                fmt_num(size * 0.4),
                self.config.door_stroke,
                escape_xml(&self.config.door_label_prefix)
            ));
            out.push_str("</g>\n");
        }
        out
    }

    /// MTEXT 已由叠加层绘制，这里只输出其余文字类型；返回片段与标签数。
    fn render_text_labels(&self, labels: &[TextLabel]) -> (String, usize) {
        let mut out = String::new();
        let mut count = 0;
        for label in labels.iter().filter(|label| label.kind != EntityType::MText) {
            count += 1;
            let font_size = if label.height > 0.0 {
                label.height
            } else {
                self.config.label_font_size
            };
            out.push_str(&format!(
                "<g class=\"text-label\" id=\"text_{count}\" stroke=\"rgb(0,0,0)\" fill=\"rgb(0,0,0)\">\
<text x=\"{}\" y=\"{}\" font-size=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text></g>\n",
                fmt_num(label.position.x()),
                fmt_num(svg_y(label.position.y())),
                fmt_num(font_size),
                escape_xml(&label.text)
            ));
        }
        (out, count)
    }
}
