// ==========================================
// 学校档案管理系统 - 档案存储 Trait
// ==========================================
// 职责: 定义导入提交与实体匹配所需的数据访问接口
// 实现者: SqliteRecordStore（使用 rusqlite）
// ==========================================

use crate::domain::record::{AttendanceRecord, ExistingEntity, PerformanceRecord, StudentRecord};
use crate::domain::types::{DuplicateStrategy, TargetSchema};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;

/// 批量写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreWriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl StoreWriteSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

// ==========================================
// RecordStore Trait
// ==========================================
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 列出目标模式的已存在实体（按写入顺序）
    async fn list_existing(&self, schema: TargetSchema) -> RepositoryResult<Vec<ExistingEntity>>;

    /// 按主键批量写入学生（按策略合并/跳过/新增）
    ///
    /// # 参数
    /// - records: 导入的学生记录
    /// - primary_key: 学生主键字段
    /// - strategy: 重复处理策略
    /// - allowed_fields: MERGE_UPDATE 时允许覆盖的字段
    ///
    /// # 返回
    /// - Err: 数据库错误（整个事务回滚）
    async fn upsert_students(
        &self,
        records: Vec<StudentRecord>,
        primary_key: &str,
        strategy: DuplicateStrategy,
        allowed_fields: &BTreeSet<String>,
    ) -> RepositoryResult<StoreWriteSummary>;

    /// 批量写入成绩（INSERT OR REPLACE，按 ID 覆盖）
    async fn insert_performance(
        &self,
        records: Vec<PerformanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary>;

    /// 批量写入考勤（INSERT OR REPLACE，按 ID 覆盖）
    async fn insert_attendance(
        &self,
        records: Vec<AttendanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary>;
}
