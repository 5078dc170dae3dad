// ==========================================
// 学校档案管理系统 - 导入层
// ==========================================
// 职责: 表格导入对账引擎
// 流程: 获取 → 列映射 → 行标准化 → 实体匹配 → 合并模拟 → 预览选择 → 提交
// 支持: Excel, ODS, CSV（本地文件或远程 URL）
// ==========================================

// 模块声明
pub mod column_mapper;
pub mod commit_executor;
pub mod data_cleaner;
pub mod entity_matcher;
pub mod error;
pub mod import_wizard;
pub mod merge_simulator;
pub mod preview_session;
pub mod row_normalizer;
pub mod workbook_source;

// 重导出核心类型
pub use column_mapper::{ColumnMapper, ColumnMapping, KeywordPolicy, KeywordPolicyTable};
pub use commit_executor::{CommitExecutor, CommitReport};
pub use data_cleaner::DataCleaner;
pub use entity_matcher::{EntityMatcher, MatchResult, MatchingOutcome};
pub use error::{ImportError, ImportResult};
pub use import_wizard::{describe_summary, ImportSettings, ImportWizard};
pub use merge_simulator::{FieldDiff, MergeSimulator, SimulatedRecord};
pub use preview_session::{PreviewRow, PreviewSession, PreviewSummary, SortDirection, SortSpec};
pub use row_normalizer::{NormalizationOutcome, RowNormalizer};

// 重导出 Trait 接口
pub use workbook_source::{
    normalize_share_url, FetchedWorkbook, SheetData, SourceInput, SpreadsheetSource, Workbook,
    WorkbookSource,
};
