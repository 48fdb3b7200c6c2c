//! 检测与分析阶段产出、合成阶段消费的标注数据。

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityType};
use crate::geometry::Point2;
use crate::text::CoordinateSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorKind {
    ArcDoor,
    InsertDoor,
    LayerDoor,
    PatternDoor,
}

impl DoorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DoorKind::ArcDoor => "ArcDoor",
            DoorKind::InsertDoor => "InsertDoor",
            DoorKind::LayerDoor => "LayerDoor",
            DoorKind::PatternDoor => "PatternDoor",
        }
    }
}

/// 门洞候选，坐标均为世界坐标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorCandidate {
    pub kind: DoorKind,
    pub center: Point2,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_span_degrees: Option<f64>,
    /// 弧度，已归一化到 [0, 2π)。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_angle: Option<f64>,
    pub confidence: f64,
    pub layer: String,
    pub source: EntityId,
    pub marker: Point2,
}

/// 识别出的文字标签。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub text: String,
    pub position: Point2,
    pub layer: String,
    pub source: EntityId,
    pub coordinate_source: CoordinateSource,
    pub height: f64,
    pub kind: EntityType,
}
