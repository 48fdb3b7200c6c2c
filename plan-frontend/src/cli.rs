use std::fs;
use std::path::{Path, PathBuf};

use plan_config::AppConfig;
use plan_engine::{Pipeline, ProcessMetadata};
use tracing::info;

use crate::converter::ExternalConverter;
use crate::errors::FrontendError;
use crate::loader::load_entities;

/// 一次命令行运行的输入输出路径。
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub metadata: PathBuf,
    /// 先调用外部转换程序把 `input` 转成实体 JSON。
    pub convert: bool,
}

impl RunRequest {
    /// 默认输出：`<input>.svg` 与 `<input>.metadata.json`。
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let output = input.with_extension("svg");
        let metadata = input.with_extension("metadata.json");
        Self {
            input,
            output,
            metadata,
            convert: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: ProcessMetadata,
}

pub fn run(request: &RunRequest, config: &AppConfig) -> Result<RunSummary, FrontendError> {
    let converted_dir = if request.convert {
        Some(tempfile::tempdir().map_err(|source| FrontendError::Write {
            path: std::env::temp_dir(),
            source,
        })?)
    } else {
        None
    };
    let entity_path = match &converted_dir {
        Some(dir) => {
            let target = dir.path().join("entities.json");
            println!("转换 {} ...", request.input.display());
            ExternalConverter::from_config(&config.converter)?.convert(&request.input, &target)?;
            target
        }
        None => request.input.clone(),
    };

    let (entities, blocks) = load_entities(&entity_path)?.into_parts();
    let pipeline = Pipeline::new(config.clone());
    let output = pipeline.process(entities, blocks, &mut |percent, stage| {
        println!("[{percent:>3}%] {stage}");
    })?;

    write_file(&request.output, output.document.as_bytes())?;
    let metadata_json = serde_json::to_vec_pretty(&output.metadata)?;
    write_file(&request.metadata, &metadata_json)?;
    info!(
        output = %request.output.display(),
        metadata = %request.metadata.display(),
        "结果已写入"
    );

    let summary = RunSummary {
        output: request.output.clone(),
        metadata_path: request.metadata.clone(),
        metadata: output.metadata,
    };
    print_summary(&summary);
    Ok(summary)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), FrontendError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| FrontendError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, bytes).map_err(|source| FrontendError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn print_summary(summary: &RunSummary) {
    let metadata = &summary.metadata;
    println!("处理完成");
    println!(
        "  实体: {} → {} (移除 {})",
        metadata.entity_count, metadata.filtered_entity_count, metadata.filter.removed
    );
    println!("  图层: {} ({})", metadata.layer_count, metadata.layers.join(", "));
    println!("  文字: {}", metadata.text_count);
    println!("  门洞: {}", metadata.door_count);
    for (index, door) in metadata.doors.iter().enumerate() {
        println!(
            "    - 门{} {} ({:.0}, {:.0}) 置信度={:.2}",
            index + 1,
            door.kind.as_str(),
            door.center.x(),
            door.center.y(),
            door.confidence
        );
    }
    let bbox = &metadata.bounding_box;
    println!(
        "  范围: ({:.1}, {:.1}) - ({:.1}, {:.1})",
        bbox.min().x(),
        bbox.min().y(),
        bbox.max().x(),
        bbox.max().y()
    );
    println!("  耗时: {} ms", metadata.processing_time_ms);
    println!("  SVG: {}", summary.output.display());
    println!("  元数据: {}", summary.metadata_path.display());
}
