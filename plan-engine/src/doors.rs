//! 门洞检测：圆弧开启线、门块名称、门图层、矩形门扇四类启发式，按发现顺序去重。

use std::f64::consts::PI;

use plan_config::DoorPolicy;
use plan_core::annotation::{DoorCandidate, DoorKind};
use plan_core::entity::{Arc, Drawing, Entity, EntityId, MAX_BLOCK_DEPTH, Primitive};
use plan_core::geometry::{Bounds2D, Point2, Vector2};
use plan_core::transform::{apply_angle, apply_point, normalize_angle, uniform_scale};
use tracing::{debug, info};

use crate::analysis::arc_span_degrees;

/// 圆弧开启线的中分角：起止角均值，跨度超过 π 时转向另一侧，结果归一化。
pub fn mid_angle(start_angle: f64, end_angle: f64) -> f64 {
    let mut mid = (start_angle + end_angle) / 2.0;
    if (end_angle - start_angle).abs() > PI {
        mid += PI;
    }
    normalize_angle(mid)
}

/// 按发现顺序去重：与已接受候选在两个轴向上的距离都小于容差即丢弃。
pub fn deduplicate(candidates: Vec<DoorCandidate>, tolerance: f64) -> Vec<DoorCandidate> {
    let mut accepted: Vec<DoorCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = accepted.iter().any(|kept| {
            (kept.center.x() - candidate.center.x()).abs() < tolerance
                && (kept.center.y() - candidate.center.y()).abs() < tolerance
        });
        if duplicate {
            debug!(
                kind = candidate.kind.as_str(),
                x = candidate.center.x(),
                y = candidate.center.y(),
                "重复门洞候选已丢弃"
            );
        } else {
            accepted.push(candidate);
        }
    }
    accepted
}

pub struct DoorDetector<'a> {
    policy: &'a DoorPolicy,
}

impl<'a> DoorDetector<'a> {
    pub fn new(policy: &'a DoorPolicy) -> Self {
        Self { policy }
    }

    /// 依次运行四类检测器，再统一去重。
    pub fn detect(&self, drawing: &Drawing) -> Vec<DoorCandidate> {
        let flattened = flatten(drawing);
        let mut candidates = Vec::new();

        for (id, entity) in &flattened {
            if let Primitive::Arc(arc) = &entity.primitive {
                candidates.extend(self.detect_arc(*id, entity, arc));
            }
        }
        let arcs = candidates.len();
        for (id, entity) in drawing.entities() {
            candidates.extend(self.detect_block(*id, entity));
        }
        let blocks = candidates.len() - arcs;
        for (id, entity) in drawing.entities() {
            candidates.extend(self.detect_layer(*id, entity));
        }
        let layers = candidates.len() - arcs - blocks;
        for (id, entity) in &flattened {
            candidates.extend(self.detect_pattern(*id, entity));
        }
        let patterns = candidates.len() - arcs - blocks - layers;

        let found = candidates.len();
        let doors = deduplicate(candidates, self.policy.dedup_tolerance);
        info!(
            arcs,
            blocks,
            layers,
            patterns,
            found,
            kept = doors.len(),
            "门洞检测完成"
        );
        doors
    }

    /// 半径（含变换缩放）与跨度都落在窗口内的圆弧视为门的开启线。
    pub fn detect_arc(&self, id: EntityId, entity: &Entity, arc: &Arc) -> Option<DoorCandidate> {
        let radius = arc.radius.abs() * uniform_scale(&entity.transforms);
        let span = arc_span_degrees(arc.start_angle, arc.end_angle);
        let policy = self.policy;
        if !(policy.radius_min..=policy.radius_max).contains(&radius)
            || !(policy.angle_min..=policy.angle_max).contains(&span)
        {
            return None;
        }
        let center = apply_point(arc.center, &entity.transforms);
        if !center.is_finite() {
            return None;
        }
        let mid = apply_angle(mid_angle(arc.start_angle, arc.end_angle), &entity.transforms);
        let offset = Vector2::from_angle(mid, radius * policy.marker_offset_ratio);
        let marker = center.translate(offset);
        debug!(entity = id.get(), radius, span, "圆弧门洞候选");
        Some(DoorCandidate {
            kind: DoorKind::ArcDoor,
            center,
            radius: Some(radius),
            angle_span_degrees: Some(span),
            mid_angle: Some(mid),
            confidence: policy.arc_confidence,
            layer: entity.layer.clone(),
            source: id,
            marker,
        })
    }

    pub fn detect_block(&self, id: EntityId, entity: &Entity) -> Option<DoorCandidate> {
        let Primitive::Insert(insert) = &entity.primitive else {
            return None;
        };
        let name = insert.block_name.to_lowercase();
        let matches = |keywords: &[String]| {
            keywords
                .iter()
                .any(|keyword| name.contains(&keyword.to_lowercase()))
        };
        let confidence = if matches(&self.policy.primary_block_keywords) {
            self.policy.primary_block_confidence
        } else if matches(&self.policy.secondary_block_keywords) {
            self.policy.secondary_block_confidence
        } else {
            return None;
        };
        let center = apply_point(insert.position, &entity.transforms);
        center.is_finite().then(|| DoorCandidate {
            kind: DoorKind::InsertDoor,
            center,
            radius: None,
            angle_span_degrees: None,
            mid_angle: None,
            confidence,
            layer: entity.layer.clone(),
            source: id,
            marker: center,
        })
    }

    /// 门图层上的几何实体；文字只是标注，不作为门洞。
    pub fn detect_layer(&self, id: EntityId, entity: &Entity) -> Option<DoorCandidate> {
        if entity.is_text() {
            return None;
        }
        let layer = entity.layer.to_lowercase();
        let on_door_layer = self
            .policy
            .layer_keywords
            .iter()
            .any(|keyword| layer.contains(&keyword.to_lowercase()));
        if !on_door_layer {
            return None;
        }
        let center = entity.anchor()?;
        Some(DoorCandidate {
            kind: DoorKind::LayerDoor,
            center,
            radius: None,
            angle_span_degrees: None,
            mid_angle: None,
            confidence: self.policy.layer_confidence,
            layer: entity.layer.clone(),
            source: id,
            marker: center,
        })
    }

    /// 闭合且至少四个顶点的多段线，外接矩形短边、长边都在门扇尺寸窗口内。
    pub fn detect_pattern(&self, id: EntityId, entity: &Entity) -> Option<DoorCandidate> {
        let Primitive::Polyline(polyline) = &entity.primitive else {
            return None;
        };
        let vertices = &polyline.vertices;
        if vertices.len() < 4 {
            return None;
        }
        let closed = polyline.closed || vertices.first() == vertices.last();
        if !closed {
            return None;
        }
        let bounds = Bounds2D::from_points(
            vertices
                .iter()
                .map(|vertex| apply_point(*vertex, &entity.transforms)),
        )?;
        let short = bounds.width().min(bounds.height());
        let long = bounds.width().max(bounds.height());
        let policy = self.policy;
        if !(policy.pattern_short_min..=policy.pattern_short_max).contains(&short)
            || !(policy.pattern_long_min..=policy.pattern_long_max).contains(&long)
        {
            return None;
        }
        let center = bounds.center();
        Some(DoorCandidate {
            kind: DoorKind::PatternDoor,
            center,
            radius: None,
            angle_span_degrees: None,
            mid_angle: None,
            confidence: policy.pattern_confidence,
            layer: entity.layer.clone(),
            source: id,
            marker: center,
        })
    }
}

/// 顶层实体加上块参照展开后的几何，块内实体沿用参照的编号。
fn flatten(drawing: &Drawing) -> Vec<(EntityId, Entity)> {
    let mut out = Vec::with_capacity(drawing.len());
    for (id, entity) in drawing.entities() {
        push_expanded(*id, entity, drawing, 0, &mut out);
    }
    out
}

fn push_expanded(
    id: EntityId,
    entity: &Entity,
    drawing: &Drawing,
    depth: usize,
    out: &mut Vec<(EntityId, Entity)>,
) {
    if let Primitive::Insert(_) = entity.primitive {
        if depth >= MAX_BLOCK_DEPTH {
            return;
        }
        for child in entity.expand(drawing.blocks()) {
            push_expanded(id, &child, drawing, depth + 1, out);
        }
    } else {
        out.push((id, entity.clone()));
    }
}
