use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

// 管道错误类型=======================================================================================
#[derive(Debug, Error)]
pub enum PipelineError {
    // 缺失必需列, 一次性报告所有缺失的列名(不只是第一个)
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    // 输入文件不存在
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    // 不支持的压缩包类型
    #[error("unsupported archive type: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    // 评分权重配置不合法
    #[error("invalid scoring weights: {0}")]
    InvalidWeights(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
