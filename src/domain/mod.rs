// ==========================================
// 学校档案管理系统 - 领域模型层
// ==========================================
// 职责: 定义导入引擎的实体、类型、字段表
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod record;
pub mod schema;
pub mod types;

// 重导出核心类型
pub use record::{
    AttendanceRecord, CellValue, ExistingEntity, NormalizedRecord, PerformanceRecord, RawRow,
    StudentRecord, TargetRecord,
};
pub use schema::{field_definitions, find_field, FieldDefinition};
pub use types::{AttendanceStatus, DuplicateStrategy, ImportStep, MatchStatus, TargetSchema};
