//! 单次处理流水线：分析 → 过滤 → 门洞检测 → 合成 → 元数据。

use std::collections::BTreeMap;

use plan_config::AppConfig;
use plan_core::annotation::{DoorCandidate, TextLabel};
use plan_core::diagnostics::LogOnce;
use plan_core::entity::{BlockTable, Drawing, Entity};
use plan_core::geometry::Bounds2D;
use plan_svg::{BaseRenderer, ComposeReport, Composer, SkeletonRenderer};
use serde::Serialize;
use tracing::{info, info_span};

use crate::analysis::{ArcStatistics, analyze_arcs, analyze_structure, analyze_texts};
use crate::doors::DoorDetector;
use crate::errors::{ErrorKind, PipelineError};
use crate::filter::{FilterReport, ImportanceFilter};
use crate::resources::{MemoryProbe, ProcMemoryProbe, ResourceGuard};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetadata {
    pub entity_count: usize,
    pub filtered_entity_count: usize,
    pub layer_count: usize,
    pub layers: Vec<String>,
    pub text_count: usize,
    pub texts: Vec<TextLabel>,
    pub door_count: usize,
    pub doors: Vec<DoorCandidate>,
    pub bounding_box: Bounds2D,
    pub type_counts: BTreeMap<String, usize>,
    pub arc_statistics: ArcStatistics,
    pub filter: FilterReport,
    pub compose: ComposeReport,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub document: String,
    pub metadata: ProcessMetadata,
}

/// 处理流水线。每次 `process` 调用都是独立的，不在调用之间保留状态。
pub struct Pipeline {
    config: AppConfig,
    renderer: Box<dyn BaseRenderer>,
    probe: Box<dyn MemoryProbe>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            renderer: Box::new(SkeletonRenderer::new()),
            probe: Box::new(ProcMemoryProbe),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn BaseRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 处理一份实体列表。进度回调在 10/30/50/70/85/95/100 处被调用。
    pub fn process(
        &self,
        entities: Vec<Entity>,
        blocks: BlockTable,
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<ProcessOutput, PipelineError> {
        let span = info_span!("process", entities = entities.len());
        let _entered = span.enter();

        let guard = ResourceGuard::start(&self.config.limits, self.probe.as_ref());
        let fail = |err: PipelineError, kind: ErrorKind, stage: &str| {
            let mut err = err.rewrap(kind, stage).with_elapsed(guard.elapsed());
            if err.details.memory.is_none() {
                if let Some(snapshot) = guard.snapshot() {
                    err = err.with_memory(snapshot);
                }
            }
            err
        };
        let mut log = LogOnce::new();

        progress(10, "加载实体");
        let mut drawing = Drawing::new(entities, blocks);

        progress(30, "结构分析");
        let analysis =
            analyze_structure(&drawing).map_err(|err| fail(err, ErrorKind::Analysis, "analysis"))?;
        let arcs = analyze_arcs(&drawing);
        let texts = analyze_texts(&drawing, &mut log);
        guard.check_memory("analysis")?;
        guard.check_time("analysis")?;

        progress(50, "重要度过滤");
        guard.check_memory("before_filter")?;
        let raw = self.config.doors.detect_on_raw.then(|| drawing.clone());
        let filter_report =
            ImportanceFilter::new(&self.config.filter).apply(&mut drawing, &analysis);
        guard.check_memory("filter")?;
        guard.check_time("filter")?;

        progress(70, "门洞检测");
        guard.check_memory("before_doors")?;
        let doors = DoorDetector::new(&self.config.doors).detect(raw.as_ref().unwrap_or(&drawing));
        drop(raw);
        guard.check_memory("doors")?;
        guard.check_time("doors")?;

        progress(85, "生成 SVG");
        guard.check_memory("before_compose")?;
        let composition = Composer::new(&self.config.composer, self.renderer.as_ref())
            .compose(&drawing, &doors, &texts, &mut log)
            .map_err(|err| {
                fail(
                    PipelineError::rendering(err.to_string()),
                    ErrorKind::Rendering,
                    "compose",
                )
            })?;
        guard.check_memory("compose")?;
        guard.check_time("compose")?;

        progress(95, "整理元数据");
        let metadata = ProcessMetadata {
            entity_count: analysis.entity_count,
            filtered_entity_count: drawing.len(),
            layer_count: analysis.layer_count(),
            layers: analysis.layer_groups.keys().cloned().collect(),
            text_count: texts.len(),
            texts,
            door_count: doors.len(),
            doors,
            bounding_box: analysis.bbox,
            type_counts: analysis
                .type_counts
                .iter()
                .map(|(kind, count)| (kind.as_str().to_string(), *count))
                .collect(),
            arc_statistics: arcs,
            filter: filter_report,
            compose: composition.report,
            processing_time_ms: guard.elapsed().as_millis() as u64,
        };

        info!(
            entities = metadata.entity_count,
            kept = metadata.filtered_entity_count,
            layers = metadata.layer_count,
            texts = metadata.text_count,
            doors = metadata.door_count,
            elapsed_ms = metadata.processing_time_ms,
            "处理完成"
        );
        progress(100, "完成");
        Ok(ProcessOutput {
            document: composition.document,
            metadata,
        })
    }
}
