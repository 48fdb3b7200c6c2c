use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use plan_config::{AppConfig, ConfigError};
use plan_frontend::{FrontendError, RunRequest};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 平面图标注：读取实体 JSON，输出带门洞与文字标注的 SVG 及元数据。
#[derive(Parser, Debug)]
#[command(name = "plan-app", version, about, long_about = None)]
struct Cli {
    /// 实体 JSON（配合 `--convert` 时为 CAD 文件）
    input: PathBuf,
    /// SVG 输出路径，默认与输入同名
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// 元数据 JSON 输出路径
    #[arg(short, long)]
    metadata: Option<PathBuf>,
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 先调用 `[converter]` 配置的外部程序转换输入
    #[arg(long)]
    convert: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, fallback) = match load_configuration(cli.config.clone()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("错误 [CONFIG_ERROR]: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);
    if let Some(err) = fallback {
        report_fallback(&err);
    }
    info!("启动平面图标注");

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<FrontendError>()
                .map(FrontendError::code)
                .unwrap_or("FILE_ERROR");
            error!(code, error = %err, "处理失败");
            eprintln!("错误 [{code}]: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    let mut request = RunRequest::new(&cli.input);
    if let Some(output) = cli.output {
        request.metadata = output.with_extension("metadata.json");
        request.output = output;
    }
    if let Some(metadata) = cli.metadata {
        request.metadata = metadata;
    }
    request.convert = cli.convert;

    plan_frontend::run(&request, config)
        .with_context(|| format!("处理 {} 失败", cli.input.display()))?;
    Ok(())
}

/// 显式指定的配置加载失败直接报错；自动发现失败时退回内建默认值，并把原因交给调用方记录。
fn load_configuration(
    override_path: Option<PathBuf>,
) -> Result<(AppConfig, Option<ConfigError>), ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(&path).map(|cfg| (cfg, None)),
        None => match AppConfig::discover() {
            Ok(cfg) => Ok((cfg, None)),
            Err(err) => Ok((AppConfig::default(), Some(err))),
        },
    }
}

fn report_fallback(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
        }
        ConfigError::Invalid { .. } | ConfigError::Context { .. } => {
            warn!(error = %err, "加载默认配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
