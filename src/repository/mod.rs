// ==========================================
// 学校档案管理系统 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod record_store;
pub mod sqlite_record_store;

pub use error::{RepositoryError, RepositoryResult};
pub use record_store::{RecordStore, StoreWriteSummary};
pub use sqlite_record_store::SqliteRecordStore;
