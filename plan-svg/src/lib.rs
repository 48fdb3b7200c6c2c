pub mod color;
pub mod compose;
pub mod markup;
mod overlay;
pub mod skeleton;

use plan_core::entity::Drawing;
use thiserror::Error;

pub use compose::{ComposeReport, Composer, Composition};
pub use markup::ViewBox;
pub use overlay::clean_mtext;
pub use skeleton::SkeletonRenderer;

#[derive(Debug, Error)]
pub enum SvgError {
    #[error("skeleton renderer failed: {0}")]
    Skeleton(String),
    #[error("overlay for {kind} entity #{id} failed: {message}")]
    Overlay {
        kind: &'static str,
        id: u64,
        message: String,
    },
    #[error("unknown block reference: {0}")]
    UnknownBlock(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("document has no drawable elements")]
    Empty,
}

/// 生成底图骨架的协作方，输出完整的 SVG 文档（需带 `viewBox`）。
pub trait BaseRenderer {
    fn render(&self, drawing: &Drawing) -> Result<String, SvgError>;
}

/// 坐标输出：保留三位小数并去掉多余的零。
pub fn fmt_num(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let mut text = format!("{rounded:.3}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
