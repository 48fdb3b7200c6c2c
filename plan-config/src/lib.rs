use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub filter: FilterPolicy,
    #[serde(default)]
    pub doors: DoorPolicy,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `PLAN_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("PLAN_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 校验区间类配置的上下界。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let doors = &self.doors;
        let ranges = [
            ("doors.radius", doors.radius_min, doors.radius_max),
            ("doors.angle", doors.angle_min, doors.angle_max),
            ("doors.pattern_short", doors.pattern_short_min, doors.pattern_short_max),
            ("doors.pattern_long", doors.pattern_long_min, doors.pattern_long_max),
        ];
        for (name, min, max) in ranges {
            if !(min <= max) {
                return Err(ConfigError::Invalid {
                    field: name.to_string(),
                    message: format!("下界 {min} 大于上界 {max}"),
                });
            }
        }
        if self.filter.grid_size == 0 {
            return Err(ConfigError::Invalid {
                field: "filter.grid_size".to_string(),
                message: "网格尺寸必须大于 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.limits.memory_high_water) {
            return Err(ConfigError::Invalid {
                field: "limits.memory_high_water".to_string(),
                message: "必须位于 [0, 1] 区间".to_string(),
            });
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 重要度过滤的权重与阈值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    pub enabled: bool,
    pub keep_threshold: f64,
    pub weights: FilterWeights,
    pub grid_size: usize,
    /// 单点密度比的上限，归一化时除以它。
    pub density_cap: f64,
    pub outlier_factor: f64,
    pub layer_name_weight: f64,
    pub layer_share_multiplier: f64,
    pub default_layer_score: f64,
    pub layer_rules: Vec<LayerRule>,
    pub type_scores: TypeScores,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_threshold: 0.4,
            weights: FilterWeights::default(),
            grid_size: 25,
            density_cap: 2.0,
            outlier_factor: 1.5,
            layer_name_weight: 0.7,
            layer_share_multiplier: 5.0,
            default_layer_score: 0.5,
            layer_rules: default_layer_rules(),
            type_scores: TypeScores::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterWeights {
    pub layer: f64,
    pub kind: f64,
    pub spatial: f64,
    pub bbox: f64,
}

impl Default for FilterWeights {
    fn default() -> Self {
        Self {
            layer: 0.3,
            kind: 0.25,
            spatial: 0.25,
            bbox: 0.2,
        }
    }
}

/// 图层名关键字规则。`exact` 为 true 时要求整名匹配（忽略大小写）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRule {
    pub keywords: Vec<String>,
    pub score: f64,
    #[serde(default)]
    pub exact: bool,
}

impl LayerRule {
    fn contains(keywords: &[&str], score: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            score,
            exact: false,
        }
    }
}

fn default_layer_rules() -> Vec<LayerRule> {
    vec![
        LayerRule::contains(&["wall", "벽"], 1.0),
        LayerRule::contains(&["door", "문"], 0.9),
        LayerRule::contains(&["window", "창"], 0.9),
        LayerRule::contains(&["room", "방"], 0.8),
        LayerRule::contains(&["text", "dim"], 0.7),
        LayerRule::contains(&["hatch", "해치"], 0.6),
        LayerRule {
            keywords: vec!["0".to_string(), "defpoints".to_string()],
            score: 0.3,
            exact: true,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeScores {
    pub line: f64,
    pub polyline: f64,
    pub arc: f64,
    pub circle: f64,
    pub insert: f64,
    pub text: f64,
    pub hatch: f64,
    pub dimension: f64,
    pub point: f64,
}

impl Default for TypeScores {
    fn default() -> Self {
        Self {
            line: 1.0,
            polyline: 0.95,
            arc: 0.9,
            circle: 0.85,
            insert: 0.8,
            text: 0.7,
            hatch: 0.6,
            dimension: 0.4,
            point: 0.2,
        }
    }
}

/// 门洞检测的几何窗口与置信度。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorPolicy {
    pub radius_min: f64,
    pub radius_max: f64,
    pub angle_min: f64,
    pub angle_max: f64,
    pub arc_confidence: f64,
    pub primary_block_keywords: Vec<String>,
    pub secondary_block_keywords: Vec<String>,
    pub primary_block_confidence: f64,
    pub secondary_block_confidence: f64,
    pub layer_keywords: Vec<String>,
    pub layer_confidence: f64,
    pub pattern_short_min: f64,
    pub pattern_short_max: f64,
    pub pattern_long_min: f64,
    pub pattern_long_max: f64,
    pub pattern_confidence: f64,
    pub dedup_tolerance: f64,
    pub marker_offset_ratio: f64,
    /// 为 true 时在过滤前的完整实体集上检测。
    pub detect_on_raw: bool,
}

impl Default for DoorPolicy {
    fn default() -> Self {
        Self {
            radius_min: 300.0,
            radius_max: 1300.0,
            angle_min: 75.0,
            angle_max: 105.0,
            arc_confidence: 0.9,
            primary_block_keywords: vec!["door".to_string(), "문".to_string()],
            secondary_block_keywords: vec!["gate".to_string(), "entrance".to_string()],
            primary_block_confidence: 0.9,
            secondary_block_confidence: 0.8,
            layer_keywords: vec!["door".to_string()],
            layer_confidence: 0.7,
            pattern_short_min: 600.0,
            pattern_short_max: 1200.0,
            pattern_long_min: 1800.0,
            pattern_long_max: 2400.0,
            pattern_confidence: 0.6,
            dedup_tolerance: 100.0,
            marker_offset_ratio: 0.8,
            detect_on_raw: false,
        }
    }
}

/// 合成阶段的颜色、尺寸与视窗参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub recolor_walls: bool,
    pub wall_color: String,
    pub door_marker_ratio: f64,
    pub door_marker_size: f64,
    pub insert_marker_size: f64,
    pub door_label_prefix: String,
    pub door_stroke: String,
    pub door_stroke_width: f64,
    pub door_fill: String,
    pub label_font_size: f64,
    pub mtext_height_ratio: f64,
    pub mtext_min_font_ratio: f64,
    pub line_spacing: f64,
    pub max_insert_depth: usize,
    pub view_min_samples: usize,
    pub view_margin_ratio: f64,
    pub view_min_margin: f64,
    pub view_max_growth: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            recolor_walls: true,
            wall_color: "#006400".to_string(),
            door_marker_ratio: 1.2,
            door_marker_size: 300.0,
            insert_marker_size: 400.0,
            door_label_prefix: "문".to_string(),
            door_stroke: "#ff0000".to_string(),
            door_stroke_width: 12.0,
            door_fill: "rgba(255,0,0,0.15)".to_string(),
            label_font_size: 120.0,
            mtext_height_ratio: 0.8,
            mtext_min_font_ratio: 0.015,
            line_spacing: 1.2,
            max_insert_depth: 8,
            view_min_samples: 10,
            view_margin_ratio: 0.05,
            view_min_margin: 50.0,
            view_max_growth: 10.0,
        }
    }
}

/// 单次处理的资源上限。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub memory_ceiling_mb: u64,
    pub memory_high_water: f64,
    pub time_limit_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_ceiling_mb: 2048,
            memory_high_water: 0.9,
            time_limit_secs: 30,
        }
    }
}

/// 外部转换器：`args` 中的 `{input}`、`{output}` 会被替换为实际路径。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["{input}".to_string(), "{output}".to_string()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置项 {field} 无效: {message}")]
    Invalid { field: String, message: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert!((cfg.filter.keep_threshold - 0.4).abs() < f64::EPSILON);
        assert_eq!(cfg.filter.grid_size, 25);
        assert_eq!(cfg.filter.layer_rules.len(), 7);
        assert!((cfg.doors.radius_min - 300.0).abs() < f64::EPSILON);
        assert!((cfg.doors.radius_max - 1300.0).abs() < f64::EPSILON);
        assert!((cfg.doors.angle_min - 75.0).abs() < f64::EPSILON);
        assert!((cfg.doors.angle_max - 105.0).abs() < f64::EPSILON);
        assert_eq!(cfg.composer.wall_color, "#006400");
        assert_eq!(cfg.limits.time_limit_secs, 30);
        assert!(cfg.converter.program.is_none());
        assert_eq!(cfg.doors.layer_keywords, vec!["door".to_string()]);
        cfg.validate().expect("默认配置应通过校验");
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [filter]
            keep_threshold = 0.5

            [doors]
            angle_min = 85.0
            angle_max = 95.0
            layer_keywords = ["a-door"]

            [composer]
            door_label_prefix = "D"

            [converter]
            program = "/usr/local/bin/dwg2json"
            args = ["--in", "{{input}}", "--out", "{{output}}"]
            timeout_secs = 5
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert!((cfg.filter.keep_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.filter.grid_size, 25);
        assert!((cfg.doors.angle_min - 85.0).abs() < f64::EPSILON);
        assert!((cfg.doors.radius_max - 1300.0).abs() < f64::EPSILON);
        assert_eq!(cfg.doors.layer_keywords, vec!["a-door".to_string()]);
        assert_eq!(cfg.composer.door_label_prefix, "D");
        assert_eq!(cfg.converter.args[1], "{input}");
        assert_eq!(cfg.converter.timeout_secs, 5);
        assert_eq!(
            cfg.converter
                .program
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("/usr/local/bin/dwg2json".to_string())
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [doors]
            radius_min = 2000.0
            radius_max = 100.0
            "#
        )
        .unwrap();

        let err = AppConfig::from_file(file.path()).expect_err("区间颠倒应报错");
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "doors.radius"));
    }

    #[test]
    fn bundled_default_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/default.toml");
        let cfg = AppConfig::from_file(&path).expect("仓库自带配置应能加载");
        assert_eq!(cfg.composer.door_label_prefix, "문");
        assert!((cfg.filter.weights.spatial - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.filter.type_scores.line, TypeScores::default().line);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).expect_err("文件不存在");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
