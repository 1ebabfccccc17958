use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// 缓存文件不存在，通常意味着还没有建立过索引
    #[error("缓存文件不存在: {0}")]
    CacheNotFound(PathBuf),

    /// 缓存文件存在，但内容无法解析
    #[error("缓存文件已损坏 ({path}): {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("图片预处理失败 ({path}): {reason}")]
    ImagePreprocessing { path: PathBuf, reason: String },

    #[error("计算特征向量失败: {0}")]
    Provider(String),

    #[error("计算特征向量超时: {0:?}")]
    ProviderTimeout(Duration),

    /// 结果数量不是合法的非负整数
    #[error("无效的结果数量: {0:?}")]
    InvalidTopK(String),

    #[error("向量维度不一致: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CacheCorrupt { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn preprocessing(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ImagePreprocessing { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn provider(reason: impl ToString) -> Self {
        Self::Provider(reason.to_string())
    }
}
