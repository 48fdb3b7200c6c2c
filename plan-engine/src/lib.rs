pub mod analysis;
pub mod doors;
pub mod filter;
pub mod pipeline;
pub mod resources;

pub use errors::{ErrorDetails, ErrorKind, MemorySnapshot, PipelineError};
pub use pipeline::{Pipeline, ProcessMetadata, ProcessOutput};

pub mod errors {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use serde::Serialize;
    use thiserror::Error;

    /// 流水线错误分类，`code()` 为对外暴露的错误码。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub enum ErrorKind {
        File,
        Conversion,
        Parsing,
        Analysis,
        Rendering,
        Memory,
        Performance,
    }

    impl ErrorKind {
        pub fn code(self) -> &'static str {
            match self {
                ErrorKind::File => "FILE_ERROR",
                ErrorKind::Conversion => "CONVERSION_ERROR",
                ErrorKind::Parsing => "PARSING_ERROR",
                ErrorKind::Analysis => "ANALYSIS_ERROR",
                ErrorKind::Rendering => "RENDERING_ERROR",
                ErrorKind::Memory => "MEMORY_ERROR",
                ErrorKind::Performance => "PERFORMANCE_ERROR",
            }
        }
    }

    /// 进程内存快照（字节）。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
    pub struct MemorySnapshot {
        pub resident_bytes: u64,
        pub ceiling_bytes: u64,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct ErrorDetails {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub stage: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub elapsed_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub memory: Option<MemorySnapshot>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        pub extra: BTreeMap<String, String>,
    }

    #[derive(Debug, Clone, Error, Serialize)]
    #[error("[{}] {}", .kind.code(), .message)]
    pub struct PipelineError {
        pub kind: ErrorKind,
        pub message: String,
        pub details: ErrorDetails,
        pub timestamp: DateTime<Utc>,
    }

    impl PipelineError {
        pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
            Self {
                kind,
                message: message.into(),
                details: ErrorDetails::default(),
                timestamp: Utc::now(),
            }
        }

        pub fn file(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::File, message)
        }

        pub fn conversion(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::Conversion, message)
        }

        pub fn parsing(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::Parsing, message)
        }

        pub fn analysis(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::Analysis, message)
        }

        pub fn rendering(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::Rendering, message)
        }

        pub fn memory(message: impl Into<String>, snapshot: MemorySnapshot) -> Self {
            Self::new(ErrorKind::Memory, message).with_memory(snapshot)
        }

        pub fn performance(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::Performance, message)
        }

        #[inline]
        pub fn code(&self) -> &'static str {
            self.kind.code()
        }

        pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
            self.details.stage = Some(stage.into());
            self
        }

        pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
            self.details.elapsed_ms = Some(elapsed.as_millis() as u64);
            self
        }

        pub fn with_memory(mut self, snapshot: MemorySnapshot) -> Self {
            self.details.memory = Some(snapshot);
            self
        }

        pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
            self.details.extra.insert(key.into(), value.to_string());
            self
        }

        /// 下层错误改写为当前阶段的类别，原错误码保留在 `cause` 中；
        /// 同类错误只补充缺失的阶段信息。
        pub fn rewrap(self, kind: ErrorKind, stage: &str) -> Self {
            if self.kind == kind {
                return if self.details.stage.is_some() {
                    self
                } else {
                    self.with_stage(stage)
                };
            }
            let mut wrapped = Self::new(kind, format!("{stage}: {}", self.message));
            wrapped.details = self.details;
            wrapped.details.stage = Some(stage.to_string());
            wrapped
                .details
                .extra
                .insert("cause".to_string(), self.kind.code().to_string());
            wrapped
        }
    }

}
