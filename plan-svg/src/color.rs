//! ACI 颜色号到 CSS 颜色的映射。

/// 主要 ACI 颜色。7 号在白底输出上按黑色处理；0 (BYBLOCK)、256 (BYLAYER) 及未收录的编号为黑色。
pub fn aci_to_rgb(index: Option<i16>) -> (u8, u8, u8) {
    match index {
        Some(1) => (255, 0, 0),
        Some(2) => (255, 255, 0),
        Some(3) => (0, 255, 0),
        Some(4) => (0, 255, 255),
        Some(5) => (0, 0, 255),
        Some(6) => (255, 0, 255),
        Some(8) => (128, 128, 128),
        Some(9) => (192, 192, 192),
        _ => (0, 0, 0),
    }
}

pub fn aci_to_css(index: Option<i16>) -> String {
    let (r, g, b) = aci_to_rgb(index);
    format!("rgb({r},{g},{b})")
}
