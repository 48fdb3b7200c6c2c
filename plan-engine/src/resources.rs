//! 内存与耗时守卫，在阶段边界检查。

use std::fs;
use std::time::{Duration, Instant};

use plan_config::ResourceLimits;
use tracing::debug;

use crate::errors::{MemorySnapshot, PipelineError};

/// 进程常驻内存的采样方式。
pub trait MemoryProbe {
    /// 返回当前常驻内存字节数；无法采样时返回 None，守卫随之跳过检查。
    fn resident_bytes(&self) -> Option<u64>;
}

/// 读取 `/proc/self/status` 中的 `VmRSS`。
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMemoryProbe;

impl MemoryProbe for ProcMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

/// 返回固定值的探针。
#[derive(Debug, Clone, Copy)]
pub struct StaticMemoryProbe(pub u64);

impl MemoryProbe for StaticMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kilobytes: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kilobytes * 1024)
}

pub struct ResourceGuard<'a> {
    limits: &'a ResourceLimits,
    probe: &'a dyn MemoryProbe,
    started: Instant,
}

impl<'a> ResourceGuard<'a> {
    pub fn start(limits: &'a ResourceLimits, probe: &'a dyn MemoryProbe) -> Self {
        Self {
            limits,
            probe,
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> Option<MemorySnapshot> {
        let resident_bytes = self.probe.resident_bytes()?;
        Some(MemorySnapshot {
            resident_bytes,
            ceiling_bytes: self.limits.memory_ceiling_mb.saturating_mul(1024 * 1024),
        })
    }

    /// 常驻内存超过上限的高水位比例时失败。
    pub fn check_memory(&self, stage: &str) -> Result<Option<MemorySnapshot>, PipelineError> {
        let Some(snapshot) = self.snapshot() else {
            return Ok(None);
        };
        let high_water = snapshot.ceiling_bytes as f64 * self.limits.memory_high_water;
        debug!(
            stage,
            resident = snapshot.resident_bytes,
            ceiling = snapshot.ceiling_bytes,
            "内存采样"
        );
        if snapshot.resident_bytes as f64 > high_water {
            return Err(PipelineError::memory(
                format!(
                    "内存使用 {} 字节超过上限 {} 字节的 {:.0}%",
                    snapshot.resident_bytes,
                    snapshot.ceiling_bytes,
                    self.limits.memory_high_water * 100.0
                ),
                snapshot,
            )
            .with_stage(stage)
            .with_elapsed(self.elapsed()));
        }
        Ok(Some(snapshot))
    }

    pub fn check_time(&self, stage: &str) -> Result<(), PipelineError> {
        let elapsed = self.elapsed();
        let limit = Duration::from_secs(self.limits.time_limit_secs);
        if elapsed >= limit {
            let mut err = PipelineError::performance(format!(
                "处理耗时 {}ms 超过上限 {}s",
                elapsed.as_millis(),
                self.limits.time_limit_secs
            ))
            .with_stage(stage)
            .with_elapsed(elapsed);
            if let Some(snapshot) = self.snapshot() {
                err = err.with_memory(snapshot);
            }
            return Err(err);
        }
        Ok(())
    }
}
