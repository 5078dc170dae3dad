// ==========================================
// 学校档案管理系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 获取错误 / 映射校验错误 / 流程错误 / 提交错误
// ==========================================

use crate::domain::types::ImportStep;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 获取错误（对当前上传步骤致命）=====
    #[error("工作簿不含任何工作表")]
    EmptyWorkbook,

    #[error("下载失败 ({url}): {message}")]
    Fetch { url: String, message: String },

    #[error("表格解析失败: {0}")]
    Parse(String),

    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.xlsb/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("工作表不存在: {0}")]
    SheetNotFound(String),

    // ===== 映射校验错误（非致命，可重新映射）=====
    #[error("{message}")]
    MappingIncomplete {
        missing: Vec<String>,
        message: String,
    },

    // ===== 流程错误 =====
    #[error("当前步骤不允许该操作: 期望 {expected}, 实际 {actual}")]
    InvalidStep {
        expected: ImportStep,
        actual: ImportStep,
    },

    // ===== 提交错误（单一汇总错误，保留选择以便重试）=====
    #[error("提交失败: {0}")]
    CommitFailed(String),

    #[error("读取已有数据失败: {0}")]
    Store(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ImportError {
    /// 是否属于获取阶段错误
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            ImportError::EmptyWorkbook
                | ImportError::Fetch { .. }
                | ImportError::Parse(_)
                | ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::SheetNotFound(_)
        )
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::Parse(err.to_string()),
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::Parse(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Fetch {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_classification() {
        assert!(ImportError::EmptyWorkbook.is_acquisition());
        assert!(ImportError::Parse("bad zip".into()).is_acquisition());
        assert!(!ImportError::CommitFailed("db down".into()).is_acquisition());
    }

    #[test]
    fn test_io_not_found_maps_to_file_not_found() {
        let err: ImportError = std::io::Error::new(std::io::ErrorKind::NotFound, "x").into();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
