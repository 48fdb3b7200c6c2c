use std::path::PathBuf;

use plan_engine::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("写入 {path:?} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("序列化元数据失败: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl FrontendError {
    /// 流水线错误码；输出阶段的错误统一归为 `FILE_ERROR`。
    pub fn code(&self) -> &'static str {
        match self {
            FrontendError::Pipeline(err) => err.code(),
            FrontendError::Write { .. } | FrontendError::Metadata(_) => "FILE_ERROR",
        }
    }
}
