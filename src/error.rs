use std::num::ParseIntError;
use std::path::PathBuf;

/// 采样错误类型
#[derive(Debug)]
pub enum PollError {
    /// 伪文件无法打开或读取
    SourceUnavailable {
        path: PathBuf,
        error: std::io::Error,
    },
    /// 期望为无符号整数的字段解析失败
    MalformedField {
        prefix: String,
        token: String,
        error: ParseIntError,
    },
    /// 文本流已结束（仅流式数据源）
    EndOfInput,
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::SourceUnavailable { path, error } => {
                write!(f, "数据源不可用 {}: {error}", path.display())
            }
            PollError::MalformedField {
                prefix,
                token,
                error,
            } => write!(f, "字段解析错误 ({prefix}) '{token}': {error}"),
            PollError::EndOfInput => write!(f, "输入已结束"),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::SourceUnavailable { error, .. } => Some(error),
            PollError::MalformedField { error, .. } => Some(error),
            PollError::EndOfInput => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PollError>;
