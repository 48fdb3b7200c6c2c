//! 平面图实体模型：显式的带标签联合体，外加图层、颜色与变换列表等公共字段。

use std::f64::consts::TAU;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2, Vector2};
use crate::text::{Text, resolve_position};
use crate::transform::{
    TransformStep, apply_point, canonical_interval, polar_point, uniform_scale,
};

/// 块表：块名 -> 块内实体，保持定义顺序。
pub type BlockTable = IndexMap<String, Vec<Entity>>;

/// 块参照展开的最大嵌套深度。
pub const MAX_BLOCK_DEPTH: usize = 8;

/// 输入列表中的下标，过滤后保持不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Line,
    Polyline,
    Arc,
    Circle,
    Point,
    Text,
    #[serde(rename = "MTEXT")]
    MText,
    Attdef,
    Attrib,
    Insert,
    Hatch,
    Dimension,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Line => "LINE",
            EntityType::Polyline => "POLYLINE",
            EntityType::Arc => "ARC",
            EntityType::Circle => "CIRCLE",
            EntityType::Point => "POINT",
            EntityType::Text => "TEXT",
            EntityType::MText => "MTEXT",
            EntityType::Attdef => "ATTDEF",
            EntityType::Attrib => "ATTRIB",
            EntityType::Insert => "INSERT",
            EntityType::Hatch => "HATCH",
            EntityType::Dimension => "DIMENSION",
        }
    }

    #[inline]
    pub fn is_text(self) -> bool {
        matches!(
            self,
            EntityType::Text | EntityType::MText | EntityType::Attdef | EntityType::Attrib
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default = "default_layer")]
    pub layer: String,
    /// ACI 颜色号；0 为 BYBLOCK，256 为 BYLAYER。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
    #[serde(flatten)]
    pub primitive: Primitive,
}

fn default_layer() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Line(Line),
    Polyline(Polyline),
    Arc(Arc),
    Circle(Circle),
    Point(Point),
    Text(Text),
    #[serde(rename = "mtext")]
    MText(Text),
    Attdef(Text),
    Attrib(Text),
    Insert(Insert),
    Hatch(Hatch),
    Dimension(Dimension),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<Point2>,
    #[serde(default)]
    pub closed: bool,
}

/// 圆弧，角度为弧度，逆时针从 `start_angle` 到 `end_angle`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Point2,
}

/// 块参照。`entities` 为解析器内联的块内容，为空时按块名查块表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    #[serde(alias = "name")]
    pub block_name: String,
    pub position: Point2,
    #[serde(default = "unit_scale")]
    pub scale: Vector2,
    /// 旋转角（度）。
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

fn unit_scale() -> Vector2 {
    Vector2::new(1.0, 1.0)
}

impl Insert {
    pub fn placement(&self) -> TransformStep {
        TransformStep::from_placement(self.position, self.scale, self.rotation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hatch {
    #[serde(default)]
    pub pattern_name: String,
    #[serde(default)]
    pub solid: bool,
    #[serde(default)]
    pub boundaries: Vec<BoundaryPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPath {
    pub vertices: Vec<Point2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub definition_point: Point2,
    pub text_midpoint: Point2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_line_point: Option<Point2>,
}

/// 折线投影中的一条路径（世界坐标）。
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub points: Vec<Point2>,
    pub closed: bool,
}

/// 弧线离散化的角度步长上限（弧度）。
const ARC_STEP: f64 = TAU / 72.0;

impl Entity {
    pub fn new(layer: impl Into<String>, primitive: Primitive) -> Self {
        Self {
            layer: layer.into(),
            color: None,
            transforms: Vec::new(),
            primitive,
        }
    }

    pub fn with_color(mut self, color: i16) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_transform(mut self, step: TransformStep) -> Self {
        self.transforms.push(step);
        self
    }

    pub fn entity_type(&self) -> EntityType {
        match &self.primitive {
            Primitive::Line(_) => EntityType::Line,
            Primitive::Polyline(_) => EntityType::Polyline,
            Primitive::Arc(_) => EntityType::Arc,
            Primitive::Circle(_) => EntityType::Circle,
            Primitive::Point(_) => EntityType::Point,
            Primitive::Text(_) => EntityType::Text,
            Primitive::MText(_) => EntityType::MText,
            Primitive::Attdef(_) => EntityType::Attdef,
            Primitive::Attrib(_) => EntityType::Attrib,
            Primitive::Insert(_) => EntityType::Insert,
            Primitive::Hatch(_) => EntityType::Hatch,
            Primitive::Dimension(_) => EntityType::Dimension,
        }
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        self.entity_type().is_text()
    }

    pub fn as_text(&self) -> Option<&Text> {
        match &self.primitive {
            Primitive::Text(text)
            | Primitive::MText(text)
            | Primitive::Attdef(text)
            | Primitive::Attrib(text) => Some(text),
            _ => None,
        }
    }

    /// 实体自身坐标系下的采样点。
    pub fn local_points(&self) -> Vec<Point2> {
        match &self.primitive {
            Primitive::Line(line) => vec![line.start, line.end],
            Primitive::Polyline(polyline) => polyline.vertices.clone(),
            Primitive::Arc(arc) => vec![arc.center],
            Primitive::Circle(circle) => vec![circle.center],
            Primitive::Point(point) => vec![point.position],
            Primitive::Text(text)
            | Primitive::MText(text)
            | Primitive::Attdef(text)
            | Primitive::Attrib(text) => vec![resolve_position(text).0],
            Primitive::Insert(insert) => vec![insert.position],
            Primitive::Hatch(hatch) => hatch
                .boundaries
                .iter()
                .flat_map(|path| path.vertices.iter().copied())
                .collect(),
            Primitive::Dimension(dimension) => {
                vec![dimension.definition_point, dimension.text_midpoint]
            }
        }
    }

    /// 经过自身变换后的世界坐标采样点，过滤器与外围判定都基于它。
    pub fn sample_points(&self) -> Vec<Point2> {
        self.local_points()
            .into_iter()
            .map(|point| apply_point(point, &self.transforms))
            .filter(|point| point.is_finite())
            .collect()
    }

    /// 世界坐标范围采样：圆与圆弧按半径外扩。
    pub fn extent_points(&self) -> Vec<Point2> {
        match &self.primitive {
            Primitive::Arc(Arc { center, radius, .. })
            | Primitive::Circle(Circle { center, radius }) => {
                let center = apply_point(*center, &self.transforms);
                let radius = radius.abs() * uniform_scale(&self.transforms);
                if !center.is_finite() || !radius.is_finite() {
                    return Vec::new();
                }
                vec![
                    Point2::new(center.x() - radius, center.y() - radius),
                    Point2::new(center.x() + radius, center.y() + radius),
                ]
            }
            _ => self.sample_points(),
        }
    }

    pub fn bounds(&self) -> Option<Bounds2D> {
        Bounds2D::from_points(self.extent_points())
    }

    /// 世界坐标下的锚点，用于图层门洞等只需要一个位置的场合。
    pub fn anchor(&self) -> Option<Point2> {
        let local = match &self.primitive {
            Primitive::Line(line) => {
                Point2::from_vec((line.start.as_vec2() + line.end.as_vec2()) * 0.5)
            }
            Primitive::Polyline(polyline) => {
                Bounds2D::from_points(polyline.vertices.iter().copied())?.center()
            }
            Primitive::Hatch(hatch) => Bounds2D::from_points(
                hatch
                    .boundaries
                    .iter()
                    .flat_map(|path| path.vertices.iter().copied()),
            )?
            .center(),
            _ => *self.local_points().first()?,
        };
        let world = apply_point(local, &self.transforms);
        world.is_finite().then_some(world)
    }

    /// 折线投影：把实体几何离散为世界坐标路径，块参照按块表递归展开。
    pub fn projection(&self, blocks: &BlockTable) -> Vec<Path> {
        let mut paths = Vec::new();
        self.project_into(blocks, 0, &mut paths);
        paths
    }

    fn project_into(&self, blocks: &BlockTable, depth: usize, out: &mut Vec<Path>) {
        let world = |points: Vec<Point2>| -> Vec<Point2> {
            points
                .into_iter()
                .map(|point| apply_point(point, &self.transforms))
                .collect()
        };
        match &self.primitive {
            Primitive::Line(line) => out.push(Path {
                points: world(vec![line.start, line.end]),
                closed: false,
            }),
            Primitive::Polyline(polyline) => {
                if polyline.vertices.len() >= 2 {
                    out.push(Path {
                        points: world(polyline.vertices.clone()),
                        closed: polyline.closed,
                    });
                }
            }
            Primitive::Arc(arc) => {
                let (start, end) = canonical_interval(arc.start_angle, arc.end_angle);
                out.push(Path {
                    points: world(tessellate(arc.center, arc.radius.abs(), start, end)),
                    closed: false,
                });
            }
            Primitive::Circle(circle) => {
                let mut points = tessellate(circle.center, circle.radius.abs(), 0.0, TAU);
                points.pop();
                out.push(Path {
                    points: world(points),
                    closed: true,
                });
            }
            Primitive::Hatch(hatch) => {
                for boundary in &hatch.boundaries {
                    if boundary.vertices.len() >= 2 {
                        out.push(Path {
                            points: world(boundary.vertices.clone()),
                            closed: true,
                        });
                    }
                }
            }
            Primitive::Dimension(dimension) => {
                let end = dimension
                    .dimension_line_point
                    .unwrap_or(dimension.text_midpoint);
                out.push(Path {
                    points: world(vec![dimension.definition_point, end]),
                    closed: false,
                });
            }
            Primitive::Insert(insert) => {
                if depth >= MAX_BLOCK_DEPTH {
                    return;
                }
                for child in self.expand_insert(insert, blocks) {
                    child.project_into(blocks, depth + 1, out);
                }
            }
            Primitive::Point(_)
            | Primitive::Text(_)
            | Primitive::MText(_)
            | Primitive::Attdef(_)
            | Primitive::Attrib(_) => {}
        }
    }

    /// 若为块参照，返回展开后的块内实体（单层）。
    pub fn expand(&self, blocks: &BlockTable) -> Vec<Entity> {
        match &self.primitive {
            Primitive::Insert(insert) => self.expand_insert(insert, blocks),
            _ => Vec::new(),
        }
    }

    /// 块内实体的变换为：自身变换、放置变换、参照实体自身变换，依次执行。
    /// 位于 "0" 图层或 BYBLOCK 颜色的块内实体继承参照的图层与颜色。
    fn expand_insert(&self, insert: &Insert, blocks: &BlockTable) -> Vec<Entity> {
        let source: &[Entity] = if insert.entities.is_empty() {
            blocks
                .get(&insert.block_name)
                .map(Vec::as_slice)
                .unwrap_or_default()
        } else {
            &insert.entities
        };
        let placement = insert.placement();
        source
            .iter()
            .map(|child| {
                let mut expanded = child.clone();
                expanded.transforms.push(placement);
                expanded.transforms.extend(self.transforms.iter().copied());
                if expanded.layer.is_empty() || expanded.layer == "0" {
                    expanded.layer = self.layer.clone();
                }
                if matches!(expanded.color, None | Some(0)) {
                    expanded.color = self.color;
                }
                expanded
            })
            .collect()
    }
}

fn tessellate(center: Point2, radius: f64, start: f64, end: f64) -> Vec<Point2> {
    let span = end - start;
    let steps = ((span / ARC_STEP).ceil() as usize).max(2);
    (0..=steps)
        .map(|index| {
            let angle = start + span * index as f64 / steps as f64;
            polar_point(center, radius, angle)
        })
        .collect()
}

/// 一次处理的工作集：带稳定编号的实体序列与块表。
#[derive(Debug, Clone, Default)]
pub struct Drawing {
    entities: Vec<(EntityId, Entity)>,
    blocks: BlockTable,
}

impl Drawing {
    pub fn new(entities: Vec<Entity>, blocks: BlockTable) -> Self {
        let entities = entities
            .into_iter()
            .enumerate()
            .map(|(index, entity)| (EntityId::new(index as u64), entity))
            .collect();
        Self { entities, blocks }
    }

    #[inline]
    pub fn entities(&self) -> &[(EntityId, Entity)] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().map(|(_, entity)| entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, entity)| entity)
    }

    #[inline]
    pub fn blocks(&self) -> &BlockTable {
        &self.blocks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 仅保留满足条件的实体，返回被移除的数量。
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(EntityId, &Entity) -> bool,
    {
        let before = self.entities.len();
        self.entities.retain(|(id, entity)| keep(*id, entity));
        before - self.entities.len()
    }

    pub fn bounds(&self) -> Option<Bounds2D> {
        Bounds2D::from_points(self.iter().flat_map(Entity::extent_points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn entity_json_uses_type_tag_and_point_arrays() {
        let json = r#"{"type": "line", "layer": "WALL", "start": [0, 0], "end": [100, 0]}"#;
        let entity: Entity = serde_json::from_str(json).expect("实体应可解析");
        assert_eq!(entity.entity_type(), EntityType::Line);
        assert_eq!(entity.layer, "WALL");
        assert_eq!(entity.sample_points().len(), 2);

        let mtext = r#"{"type": "mtext", "content": "A\\PB", "position": [1, 2]}"#;
        let entity: Entity = serde_json::from_str(mtext).expect("MTEXT 应可解析");
        assert_eq!(entity.entity_type(), EntityType::MText);
        assert_eq!(entity.layer, "0");
        assert!(entity.is_text());
    }

    #[test]
    fn circle_extent_is_inflated_by_scaled_radius() {
        let circle = Entity::new(
            "0",
            Primitive::Circle(Circle {
                center: Point2::new(0.0, 0.0),
                radius: 10.0,
            }),
        )
        .with_transform(TransformStep {
            scale_x: 2.0,
            ..TransformStep::identity()
        });
        let bounds = circle.bounds().expect("bounds");
        assert_eq!(bounds.min(), Point2::new(-20.0, -20.0));
        assert_eq!(bounds.max(), Point2::new(20.0, 20.0));
    }

    #[test]
    fn insert_expansion_appends_placement_and_inherits_layer() {
        let mut blocks = BlockTable::new();
        blocks.insert("DOOR_90".into(), vec![line("0", (0.0, 0.0), (10.0, 0.0))]);
        let insert = Entity::new(
            "A-DOOR",
            Primitive::Insert(Insert {
                block_name: "DOOR_90".into(),
                position: Point2::new(100.0, 100.0),
                scale: Vector2::new(1.0, 1.0),
                rotation: 90.0,
                entities: Vec::new(),
            }),
        )
        .with_color(3);
        let children = insert.expand(&blocks);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].layer, "A-DOOR");
        assert_eq!(children[0].color, Some(3));
        let points = children[0].sample_points();
        assert!((points[1].x() - 100.0).abs() < 1e-9);
        assert!((points[1].y() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn projection_tessellates_arcs_and_stops_at_depth_limit() {
        let arc = Entity::new(
            "DOOR",
            Primitive::Arc(Arc {
                center: Point2::new(0.0, 0.0),
                radius: 100.0,
                start_angle: 0.0,
                end_angle: std::f64::consts::FRAC_PI_2,
            }),
        );
        let paths = arc.projection(&BlockTable::new());
        assert_eq!(paths.len(), 1);
        assert!(paths[0].points.len() > 2);

        let mut blocks = BlockTable::new();
        let recursive = Entity::new(
            "0",
            Primitive::Insert(Insert {
                block_name: "SELF".into(),
                position: Point2::ORIGIN,
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                entities: Vec::new(),
            }),
        );
        blocks.insert("SELF".into(), vec![recursive.clone()]);
        assert!(recursive.projection(&blocks).is_empty());
    }

    #[test]
    fn drawing_retain_keeps_stable_ids() {
        let mut drawing = Drawing::new(
            vec![
                line("A", (0.0, 0.0), (1.0, 0.0)),
                line("B", (0.0, 0.0), (1.0, 0.0)),
                line("C", (0.0, 0.0), (1.0, 0.0)),
            ],
            BlockTable::new(),
        );
        let removed = drawing.retain(|_, entity| entity.layer != "B");
        assert_eq!(removed, 1);
        let ids: Vec<u64> = drawing.entities().iter().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(drawing.entity(EntityId::new(2)).is_some());
    }
}
