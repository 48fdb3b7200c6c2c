//! 重要度过滤：图层、类型、空间密度、范围四项加权打分，外加外围实体剔除。
//! 文字类实体永远保留，过滤只删除不新增。

use std::collections::BTreeMap;

use indexmap::IndexMap;
use plan_config::FilterPolicy;
use plan_core::entity::{Drawing, Entity, EntityType};
use plan_core::geometry::{Bounds2D, Point2};
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::StructureAnalysis;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerImportance {
    pub layer: String,
    pub name_score: f64,
    pub count_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterReport {
    pub before: usize,
    pub after: usize,
    pub removed: usize,
    pub outliers: usize,
    pub layers: Vec<LayerImportance>,
}

/// 单个实体的分项得分。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityScore {
    pub layer: f64,
    pub kind: f64,
    pub spatial: f64,
    pub bbox: f64,
    pub total: f64,
}

/// 折线投影上的密度网格。
#[derive(Debug, Clone)]
pub struct DensityGrid {
    bounds: Bounds2D,
    size: usize,
    counts: Vec<usize>,
    mean: f64,
}

impl DensityGrid {
    pub fn build(bounds: Bounds2D, size: usize, vertices: &[Point2]) -> Self {
        let size = size.max(1);
        let mut grid = Self {
            bounds,
            size,
            counts: vec![0; size * size],
            mean: 0.0,
        };
        for vertex in vertices {
            if let Some(index) = grid.cell_index(*vertex) {
                grid.counts[index] += 1;
            }
        }
        let occupied: Vec<usize> = grid.counts.iter().copied().filter(|c| *c > 0).collect();
        if !occupied.is_empty() {
            grid.mean = occupied.iter().sum::<usize>() as f64 / occupied.len() as f64;
        }
        grid
    }

    #[inline]
    pub fn bounds(&self) -> Bounds2D {
        self.bounds
    }

    /// 所在单元格的下标；范围外返回 None。退化为零宽/零高时该轴只有一列。
    pub fn cell_index(&self, point: Point2) -> Option<usize> {
        if !self.bounds.contains(point) {
            return None;
        }
        let axis = |value: f64, min: f64, extent: f64| -> usize {
            if extent <= f64::EPSILON {
                return 0;
            }
            let cell = ((value - min) / extent * self.size as f64).floor() as usize;
            cell.min(self.size - 1)
        };
        let column = axis(point.x(), self.bounds.min().x(), self.bounds.width());
        let row = axis(point.y(), self.bounds.min().y(), self.bounds.height());
        Some(row * self.size + column)
    }

    pub fn count_at(&self, point: Point2) -> Option<usize> {
        self.cell_index(point).map(|index| self.counts[index])
    }

    /// 非空单元格的平均计数。
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }
}

pub struct ImportanceFilter<'a> {
    policy: &'a FilterPolicy,
}

impl<'a> ImportanceFilter<'a> {
    pub fn new(policy: &'a FilterPolicy) -> Self {
        Self { policy }
    }

    /// 按规则顺序匹配图层名，首个命中的规则给分。
    pub fn layer_name_score(&self, layer: &str) -> f64 {
        let name = layer.to_lowercase();
        for rule in &self.policy.layer_rules {
            let hit = rule.keywords.iter().any(|keyword| {
                let keyword = keyword.to_lowercase();
                if rule.exact {
                    name == keyword
                } else {
                    name.contains(&keyword)
                }
            });
            if hit {
                return rule.score;
            }
        }
        self.policy.default_layer_score
    }

    pub fn type_score(&self, kind: EntityType) -> f64 {
        let scores = &self.policy.type_scores;
        match kind {
            EntityType::Line => scores.line,
            EntityType::Polyline => scores.polyline,
            EntityType::Arc => scores.arc,
            EntityType::Circle => scores.circle,
            EntityType::Insert => scores.insert,
            EntityType::Text | EntityType::MText | EntityType::Attdef | EntityType::Attrib => {
                scores.text
            }
            EntityType::Hatch => scores.hatch,
            EntityType::Dimension => scores.dimension,
            EntityType::Point => scores.point,
        }
    }

    pub fn layer_importance(
        &self,
        analysis: &StructureAnalysis,
    ) -> IndexMap<String, LayerImportance> {
        let total = analysis.entity_count.max(1) as f64;
        let name_weight = self.policy.layer_name_weight;
        analysis
            .layer_groups
            .iter()
            .map(|(layer, members)| {
                let name_score = self.layer_name_score(layer);
                let share = members.len() as f64 / total;
                let count_score = (share * self.policy.layer_share_multiplier).min(1.0);
                let final_score = name_weight * name_score + (1.0 - name_weight) * count_score;
                (
                    layer.clone(),
                    LayerImportance {
                        layer: layer.clone(),
                        name_score,
                        count_score,
                        final_score,
                    },
                )
            })
            .collect()
    }

    /// 采样点的平均密度得分；点都不在网格内时取 0.5。
    pub fn spatial_score(&self, grid: &DensityGrid, samples: &[Point2]) -> f64 {
        let cap = self.policy.density_cap.max(f64::EPSILON);
        let mut total = 0.0;
        let mut counted = 0usize;
        for sample in samples {
            let Some(count) = grid.count_at(*sample) else {
                continue;
            };
            let ratio = if grid.mean() > 0.0 {
                (count as f64 / grid.mean()).min(cap) / cap
            } else {
                0.5
            };
            total += ratio;
            counted += 1;
        }
        if counted == 0 { 0.5 } else { total / counted as f64 }
    }

    pub fn bbox_score(bounds: &Bounds2D, samples: &[Point2]) -> f64 {
        if samples.is_empty() {
            return 1.0;
        }
        let inside = samples.iter().filter(|point| bounds.contains(**point)).count();
        inside as f64 / samples.len() as f64
    }

    /// 任一采样点离参考范围中心超过 `outlier_factor × max(宽, 高)` 即视为外围实体。
    pub fn is_outlier(&self, bounds: &Bounds2D, samples: &[Point2]) -> bool {
        let center = bounds.center();
        let limit = bounds.larger_dimension() * self.policy.outlier_factor;
        samples.iter().any(|point| point.distance(center) > limit)
    }

    pub fn score(
        &self,
        entity: &Entity,
        samples: &[Point2],
        layers: &IndexMap<String, LayerImportance>,
        grid: &DensityGrid,
    ) -> EntityScore {
        let weights = &self.policy.weights;
        let layer = layers
            .get(&entity.layer)
            .map(|importance| importance.final_score)
            .unwrap_or(self.policy.default_layer_score);
        let kind = self.type_score(entity.entity_type());
        let spatial = self.spatial_score(grid, samples);
        let bbox = Self::bbox_score(&grid.bounds(), samples);
        let total = weights.layer * layer
            + weights.kind * kind
            + weights.spatial * spatial
            + weights.bbox * bbox;
        EntityScore {
            layer,
            kind,
            spatial,
            bbox,
            total,
        }
    }

    /// 就地过滤工作集。参考范围取全部实体折线投影的范围，投影为空时退回结构分析的范围。
    pub fn apply(&self, drawing: &mut Drawing, analysis: &StructureAnalysis) -> FilterReport {
        let before = drawing.len();
        let layers = self.layer_importance(analysis);
        let mut report = FilterReport {
            before,
            after: before,
            layers: layers.values().cloned().collect(),
            ..FilterReport::default()
        };
        if !self.policy.enabled {
            info!(entities = before, "重要度过滤已关闭");
            return report;
        }

        let vertices: Vec<Point2> = drawing
            .iter()
            .flat_map(|entity| entity.projection(drawing.blocks()))
            .flat_map(|path| path.points)
            .filter(|point| point.is_finite())
            .collect();
        let reference = Bounds2D::from_points(vertices.iter().copied()).unwrap_or(analysis.bbox);
        let grid = DensityGrid::build(reference, self.policy.grid_size, &vertices);

        let mut outliers = 0usize;
        let removed = drawing.retain(|id, entity| {
            if entity.is_text() {
                return true;
            }
            let samples = entity.sample_points();
            if self.is_outlier(&reference, &samples) {
                outliers += 1;
                debug!(entity = id.get(), kind = entity.entity_type().as_str(), "外围实体已剔除");
                return false;
            }
            let score = self.score(entity, &samples, &layers, &grid);
            score.total >= self.policy.keep_threshold
        });

        report.after = drawing.len();
        report.removed = removed;
        report.outliers = outliers;
        log_summary(drawing, &report);
        report
    }
}

fn log_summary(drawing: &Drawing, report: &FilterReport) {
    let mut per_layer: BTreeMap<&str, usize> = BTreeMap::new();
    let mut per_type: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entity in drawing.iter() {
        *per_layer.entry(entity.layer.as_str()).or_insert(0) += 1;
        *per_type.entry(entity.entity_type().as_str()).or_insert(0) += 1;
    }
    info!(
        before = report.before,
        after = report.after,
        removed = report.removed,
        outliers = report.outliers,
        "重要度过滤完成"
    );
    for (layer, count) in per_layer {
        debug!(layer, count, "保留的图层实体");
    }
    for (kind, count) in per_type {
        debug!(kind, count, "保留的实体类型");
    }
}
