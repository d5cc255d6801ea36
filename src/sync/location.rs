//! 地点相似度判断，纯函数，不做任何 I/O

use std::collections::HashSet;

/// 经纬度差均小于该值视为同一地点，约 500 米
pub const COORDINATE_THRESHOLD: f64 = 0.005;

/// 文本匹配至少需要的共同关键词数
pub const MIN_SHARED_TOKENS: usize = 2;

// 英语和挪威语里常见的冠词、介词，不参与比较
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "in", "of", "on", "the", "to", "av", "de", "den",
    "det", "en", "et", "i", "ei", "med", "og", "pa", "på", "til", "ved",
];

/// 一侧的地点信息
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationRef<'a> {
    pub text: Option<&'a str>,
    pub coordinates: Option<(f64, f64)>,
}

impl LocationRef<'_> {
    fn is_empty(&self) -> bool {
        self.coordinates.is_none() && self.text.is_none_or(|t| t.trim().is_empty())
    }
}

/// 判断本地事件与远端事件的地点是否兼容
///
/// 远端没有地点时只按时间匹配；双方都有坐标时比较坐标；
/// 否则退回到场地名/地址的关键词重合
pub fn locations_match(local: LocationRef<'_>, remote: LocationRef<'_>) -> bool {
    if remote.is_empty() {
        return true;
    }

    if let (Some(a), Some(b)) = (local.coordinates, remote.coordinates) {
        return coordinates_close(a, b);
    }

    match (local.text, remote.text) {
        (Some(a), Some(b)) => texts_match(a, b),
        _ => false,
    }
}

pub fn coordinates_close(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() < COORDINATE_THRESHOLD && (a.1 - b.1).abs() < COORDINATE_THRESHOLD
}

/// 小写、按非字母数字切分、去掉停用词
pub fn significant_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty() && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

pub fn texts_match(a: &str, b: &str) -> bool {
    let a_tokens = significant_tokens(a);
    let b_tokens = significant_tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return false;
    }

    let a_joined = a_tokens.join(" ");
    let b_joined = b_tokens.join(" ");
    if a_joined.contains(&b_joined) || b_joined.contains(&a_joined) {
        return true;
    }

    let a_set: HashSet<&str> = a_tokens.iter().map(String::as_str).collect();
    let shared = b_tokens
        .iter()
        .map(String::as_str)
        .collect::<HashSet<_>>()
        .intersection(&a_set)
        .count();
    shared >= MIN_SHARED_TOKENS
}
