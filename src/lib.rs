// ==========================================
// 学校档案管理系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 范围: 表格导入对账引擎（映射 → 标准化 → 匹配 → 模拟 → 预览 → 提交）
// 系统定位: 导入前预览，人工最终确认
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AttendanceStatus, DuplicateStrategy, ImportStep, MatchStatus, TargetSchema};

// 领域记录
pub use domain::{
    AttendanceRecord, CellValue, NormalizedRecord, PerformanceRecord, RawRow, StudentRecord,
    TargetRecord,
};

// 导入引擎
pub use importer::{
    ColumnMapper, CommitExecutor, EntityMatcher, ImportError, ImportWizard, MergeSimulator,
    PreviewSession, RowNormalizer, SpreadsheetSource, WorkbookSource,
};

// 存储
pub use repository::{RecordStore, SqliteRecordStore};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "学校档案管理系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
