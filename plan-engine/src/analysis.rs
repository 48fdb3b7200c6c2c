//! 只读分析：结构（范围、图层分组、类型计数）、圆弧跨度与文字识别。

use std::collections::BTreeMap;

use indexmap::IndexMap;
use plan_core::annotation::TextLabel;
use plan_core::diagnostics::LogOnce;
use plan_core::entity::{Drawing, EntityId, EntityType, Primitive};
use plan_core::geometry::Bounds2D;
use plan_core::text::resolve_text;
use plan_core::transform::apply_point;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::PipelineError;

/// 近似直角的跨度区间（度）。
const NEAR_RIGHT_ANGLE: (f64, f64) = (80.0, 100.0);

#[derive(Debug, Clone, PartialEq)]
pub struct StructureAnalysis {
    pub bbox: Bounds2D,
    /// 图层 -> 实体编号，保持首次出现的顺序。
    pub layer_groups: IndexMap<String, Vec<EntityId>>,
    pub entity_count: usize,
    pub type_counts: BTreeMap<EntityType, usize>,
}

impl StructureAnalysis {
    pub fn layer_count(&self) -> usize {
        self.layer_groups.len()
    }
}

/// 统计范围、图层与类型。空输入或没有任何坐标时返回分析错误。
pub fn analyze_structure(drawing: &Drawing) -> Result<StructureAnalysis, PipelineError> {
    if drawing.is_empty() {
        return Err(PipelineError::analysis("实体列表为空，无法分析").with_stage("analysis"));
    }

    let mut layer_groups: IndexMap<String, Vec<EntityId>> = IndexMap::new();
    let mut type_counts = BTreeMap::new();
    let mut bbox = Bounds2D::empty();
    for (id, entity) in drawing.entities() {
        layer_groups
            .entry(entity.layer.clone())
            .or_default()
            .push(*id);
        *type_counts.entry(entity.entity_type()).or_insert(0) += 1;
        for point in entity.extent_points() {
            bbox.include_point(point);
        }
    }

    if bbox.is_empty() {
        return Err(PipelineError::analysis("没有任何带坐标的实体，无法计算范围")
            .with_stage("analysis")
            .with_detail("entities", drawing.len()));
    }

    info!(
        entities = drawing.len(),
        layers = layer_groups.len(),
        min_x = bbox.min().x(),
        min_y = bbox.min().y(),
        max_x = bbox.max().x(),
        max_y = bbox.max().y(),
        "结构分析完成"
    );
    Ok(StructureAnalysis {
        bbox,
        layer_groups,
        entity_count: drawing.len(),
        type_counts,
    })
}

/// 起止角（弧度）之间的跨度，折算到 [0, 180] 度。
pub fn arc_span_degrees(start_angle: f64, end_angle: f64) -> f64 {
    let span = (end_angle - start_angle).abs().to_degrees() % 360.0;
    if span > 180.0 { 360.0 - span } else { span }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArcStatistics {
    pub total: usize,
    /// 跨度落在 80–100 度之间的圆弧。
    pub near_right_angle: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_span: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_span: Option<f64>,
}

pub fn analyze_arcs(drawing: &Drawing) -> ArcStatistics {
    let mut stats = ArcStatistics::default();
    for (id, entity) in drawing.entities() {
        let Primitive::Arc(arc) = &entity.primitive else {
            continue;
        };
        let span = arc_span_degrees(arc.start_angle, arc.end_angle);
        stats.total += 1;
        stats.min_span = Some(stats.min_span.map_or(span, |current| current.min(span)));
        stats.max_span = Some(stats.max_span.map_or(span, |current| current.max(span)));
        if (NEAR_RIGHT_ANGLE.0..=NEAR_RIGHT_ANGLE.1).contains(&span) {
            stats.near_right_angle += 1;
            debug!(
                entity = id.get(),
                layer = %entity.layer,
                radius = arc.radius,
                span,
                "近似直角圆弧"
            );
        }
    }
    debug!(
        total = stats.total,
        near_right_angle = stats.near_right_angle,
        "圆弧分析完成"
    );
    stats
}

/// 收集所有非空文字，位置为解析后的插入点经过实体变换的结果。
pub fn analyze_texts(drawing: &Drawing, log: &mut LogOnce) -> Vec<TextLabel> {
    let mut labels = Vec::new();
    let mut discarded = 0usize;
    for (id, entity) in drawing.entities() {
        let Some(text) = entity.as_text() else {
            continue;
        };
        let kind = entity.entity_type();
        let Some(resolved) = resolve_text(text) else {
            discarded += 1;
            continue;
        };
        if log.first(format!("{}_{}", kind.as_str(), resolved.source.as_str())) {
            debug!(
                kind = kind.as_str(),
                source = resolved.source.as_str(),
                "文字坐标来源"
            );
        }
        labels.push(TextLabel {
            text: resolved.content,
            position: apply_point(resolved.position, &entity.transforms),
            layer: entity.layer.clone(),
            source: *id,
            coordinate_source: resolved.source,
            height: text.height,
            kind,
        });
    }
    debug!(found = labels.len(), discarded, "文字识别完成");
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_core::entity::{Arc, BlockTable, Entity, Line};
    use plan_core::geometry::Point2;
    use plan_core::text::Text;

    fn line(layer: &str, start: (f64, f64), end: (f64, f64)) -> Entity {
        Entity::new(
            layer,
            Primitive::Line(Line {
                start: Point2::new(start.0, start.1),
                end: Point2::new(end.0, end.1),
            }),
        )
    }

    #[test]
    fn layer_groups_keep_first_seen_order() {
        let drawing = Drawing::new(
            vec![
                line("WALL", (0.0, 0.0), (10.0, 0.0)),
                line("DOOR", (0.0, 0.0), (0.0, 10.0)),
                line("WALL", (10.0, 0.0), (10.0, 10.0)),
            ],
            BlockTable::new(),
        );
        let analysis = analyze_structure(&drawing).expect("analysis");
        let layers: Vec<&str> = analysis.layer_groups.keys().map(String::as_str).collect();
        assert_eq!(layers, vec!["WALL", "DOOR"]);
        assert_eq!(analysis.layer_groups["WALL"].len(), 2);
        assert_eq!(analysis.type_counts[&EntityType::Line], 3);
        assert_eq!(analysis.bbox.max(), Point2::new(10.0, 10.0));
    }

    #[test]
    fn entities_without_coordinates_fail_analysis() {
        let drawing = Drawing::new(
            vec![Entity::new(
                "0",
                Primitive::Polyline(plan_core::entity::Polyline {
                    vertices: Vec::new(),
                    closed: false,
                }),
            )],
            BlockTable::new(),
        );
        let err = analyze_structure(&drawing).expect_err("no coordinates");
        assert_eq!(err.code(), "ANALYSIS_ERROR");
    }

    #[test]
    fn arc_span_folds_into_half_turn() {
        assert!((arc_span_degrees(0.0, std::f64::consts::FRAC_PI_2) - 90.0).abs() < 1e-9);
        assert!((arc_span_degrees(0.0, 270f64.to_radians()) - 90.0).abs() < 1e-9);
        let wrapped = arc_span_degrees(0.0, 720f64.to_radians() + 0.1);
        assert!((wrapped - 0.1f64.to_degrees()).abs() < 1e-6);
        assert!(arc_span_degrees(-10.0, 10.0) <= 180.0);
    }

    #[test]
    fn arc_statistics_count_near_right_angles() {
        let arc = |start: f64, end: f64| {
            Entity::new(
                "DOOR",
                Primitive::Arc(Arc {
                    center: Point2::ORIGIN,
                    radius: 900.0,
                    start_angle: start.to_radians(),
                    end_angle: end.to_radians(),
                }),
            )
        };
        let drawing = Drawing::new(
            vec![arc(0.0, 90.0), arc(0.0, 45.0), arc(10.0, 105.0)],
            BlockTable::new(),
        );
        let stats = analyze_arcs(&drawing);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.near_right_angle, 2);
        assert!((stats.min_span.unwrap_or_default() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn text_analysis_is_idempotent_and_skips_empty_content() {
        let text = |content: &str| {
            Entity::new(
                "TEXT",
                Primitive::Text(Text {
                    content: content.into(),
                    position: Some(Point2::new(5.0, 5.0)),
                    ..Text::default()
                }),
            )
        };
        let drawing = Drawing::new(vec![text(""), text("KITCHEN")], BlockTable::new());
        let first = analyze_texts(&drawing, &mut LogOnce::new());
        let second = analyze_texts(&drawing, &mut LogOnce::new());
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].text, "KITCHEN");
        assert_eq!(first[0].source, EntityId::new(1));
    }
}
