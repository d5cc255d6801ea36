use std::fmt;

use serde::{Deserialize, Serialize};

// Spond 内部 ID 为 32 位十六进制，不同接口的大小写和连字符不一致
const ID_LEN: usize = 32;

/// 规范化 Spond ID：去掉分隔符、转大写，不是 32 位十六进制则返回 None
///
/// 只去掉标点和空白，非 ASCII 字母保留下来让十六进制检查失败
pub fn normalize(id: &str) -> Option<String> {
    let canonical: String = id
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if canonical.len() == ID_LEN && canonical.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(canonical)
    } else {
        None
    }
}

/// 已规范化的 Spond 标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpondId(String);

impl SpondId {
    pub fn parse(raw: &str) -> Option<Self> {
        normalize(raw).map(SpondId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpondId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SpondId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SpondId::parse(&value).ok_or_else(|| format!("invalid Spond id: {}", value))
    }
}

impl From<SpondId> for String {
    fn from(id: SpondId) -> Self {
        id.0
    }
}

impl AsRef<str> for SpondId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
