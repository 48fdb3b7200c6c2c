use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use plan_config::ConverterConfig;
use plan_engine::PipelineError;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// 调用外部程序把 CAD 文件转换成实体 JSON。等待有硬超时，失败不重试。
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Result<Self, PipelineError> {
        let Some(program) = &config.program else {
            return Err(PipelineError::conversion("未配置外部转换程序 [converter] program")
                .with_stage("convert"));
        };
        Ok(Self::new(
            program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 替换参数中的 `{input}` / `{output}` 占位符。
    pub fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    pub fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let args = self.expand_args(input, output);
        debug!(program = %self.program.display(), ?args, "启动外部转换程序");
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                PipelineError::conversion(format!(
                    "无法启动转换程序 {}: {err}",
                    self.program.display()
                ))
                .with_stage("convert")
                .with_detail("program", self.program.display())
            })?;

        loop {
            let status = child.try_wait().map_err(|err| {
                PipelineError::conversion(format!("等待转换程序失败: {err}"))
                    .with_stage("convert")
                    .with_elapsed(started.elapsed())
            })?;
            if let Some(status) = status {
                if !status.success() {
                    return Err(PipelineError::conversion(format!(
                        "转换程序以非零状态退出: {status}"
                    ))
                    .with_stage("convert")
                    .with_elapsed(started.elapsed())
                    .with_detail("program", self.program.display()));
                }
                break;
            }
            if started.elapsed() >= self.timeout {
                if let Err(err) = child.kill() {
                    warn!(error = %err, "终止超时的转换程序失败");
                }
                let _ = child.wait();
                return Err(PipelineError::conversion(format!(
                    "转换超时（{} 秒）",
                    self.timeout.as_secs()
                ))
                .with_stage("convert")
                .with_elapsed(started.elapsed())
                .with_detail("timeout_secs", self.timeout.as_secs()));
            }
            thread::sleep(POLL_INTERVAL);
        }

        if !output.exists() {
            return Err(PipelineError::conversion(format!(
                "转换程序未生成输出文件 {}",
                output.display()
            ))
            .with_stage("convert"));
        }
        info!(
            input = %input.display(),
            output = %output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "外部转换完成"
        );
        Ok(())
    }
}
