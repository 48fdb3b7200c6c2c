use std::fs;
use std::path::Path;

use plan_core::entity::{BlockTable, Entity};
use plan_engine::PipelineError;
use serde::Deserialize;
use tracing::{debug, info};

/// 解析器交付的实体文档：顶层实体列表加块定义表。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityDocument {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub blocks: BlockTable,
}

impl EntityDocument {
    pub fn into_parts(self) -> (Vec<Entity>, BlockTable) {
        (self.entities, self.blocks)
    }
}

/// 从 JSON 文件加载实体文档。
///
/// 文件缺失或不可读返回 `FILE_ERROR`，内容不是合法的实体 JSON 返回 `PARSING_ERROR`。
pub fn load_entities(path: &Path) -> Result<EntityDocument, PipelineError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        PipelineError::file(format!("无法读取输入文件 {}: {err}", path.display()))
            .with_stage("load")
            .with_detail("path", path.display())
    })?;
    let document = parse_entities(&raw)
        .map_err(|err| err.with_detail("path", path.display()))?;
    info!(
        path = %path.display(),
        entities = document.entities.len(),
        blocks = document.blocks.len(),
        "实体文档加载完成"
    );
    Ok(document)
}

pub fn parse_entities(raw: &str) -> Result<EntityDocument, PipelineError> {
    serde_json::from_str::<EntityDocument>(raw).map_err(|err| {
        debug!(line = err.line(), column = err.column(), "实体 JSON 解析失败");
        PipelineError::parsing(format!("实体 JSON 格式错误: {err}"))
            .with_stage("load")
            .with_detail("line", err.line())
            .with_detail("column", err.column())
    })
}
