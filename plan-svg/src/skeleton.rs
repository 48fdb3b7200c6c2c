use indexmap::IndexMap;
use plan_core::entity::{Drawing, Entity, EntityType};
use tracing::debug;

use crate::color::aci_to_css;
use crate::markup::{ViewBox, path_data};
use crate::{BaseRenderer, SvgError, escape_xml};

const SKELETON_CSS: &str = ".skeleton path { stroke-width: 1; vector-effect: non-scaling-stroke; }";

/// 默认底图：直线、多段线、圆弧与圆按图层分组输出为路径。
/// 文字、填充、标注和块参照留给合成阶段的叠加层处理。
#[derive(Debug, Default, Clone, Copy)]
pub struct SkeletonRenderer;

impl SkeletonRenderer {
    pub fn new() -> Self {
        Self
    }

    fn is_skeleton_kind(entity: &Entity) -> bool {
        matches!(
            entity.entity_type(),
            EntityType::Line | EntityType::Polyline | EntityType::Arc | EntityType::Circle
        )
    }
}

impl BaseRenderer for SkeletonRenderer {
    fn render(&self, drawing: &Drawing) -> Result<String, SvgError> {
        let view = drawing
            .bounds()
            .map(|bounds| ViewBox::from_world(&bounds))
            .unwrap_or(ViewBox {
                min_x: 0.0,
                min_y: 0.0,
                width: 1.0,
                height: 1.0,
            });
        if !(view.min_x.is_finite() && view.min_y.is_finite()) {
            return Err(SvgError::Skeleton("drawing extent is not finite".to_string()));
        }

        let mut layers: IndexMap<&str, Vec<&Entity>> = IndexMap::new();
        for entity in drawing.iter().filter(|entity| Self::is_skeleton_kind(entity)) {
            layers.entry(entity.layer.as_str()).or_default().push(entity);
        }

        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"{}\">\n",
            view.to_attr()
        ));
        svg.push_str(&format!("<style>\n{SKELETON_CSS}\n</style>\n"));

        let mut paths = 0usize;
        for (layer, entities) in &layers {
            svg.push_str(&format!(
                "<g class=\"skeleton\" data-layer=\"{}\">\n",
                escape_xml(layer)
            ));
            for entity in entities {
                let stroke = aci_to_css(entity.color);
                for path in entity.projection(drawing.blocks()) {
                    if path.points.len() < 2 {
                        continue;
                    }
                    svg.push_str(&format!(
                        "  <path d=\"{}\" stroke=\"{}\" fill=\"none\"/>\n",
                        path_data(&path.points, path.closed),
                        stroke
                    ));
                    paths += 1;
                }
            }
            svg.push_str("</g>\n");
        }
        svg.push_str("</svg>\n");

        debug!(layers = layers.len(), paths, "底图骨架生成完成");
        Ok(svg)
    }
}
