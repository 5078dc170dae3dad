// ==========================================
// 学校档案管理系统 - 合并模拟器
// ==========================================
// 职责: 在不修改存储的前提下，计算提交后记录的最终状态
// 策略:
// - FORCE_NEW: 原样采用导入记录，状态 NEW（即使命中已有实体）
// - SKIP_EXISTING: 命中 → 已有实体原样复制，状态 SKIP；未命中 → NEW
// - MERGE_UPDATE: 命中 → 以已有实体为底，允许字段中
//   导入值 TRIM 后非空者覆盖，状态 UPDATE；未命中 → NEW
// 红线: 纯函数；绝不以空值覆盖已有数据
// ==========================================

use crate::domain::record::{is_blank, TargetRecord};
use crate::domain::types::{DuplicateStrategy, MatchStatus};
use crate::importer::entity_matcher::MatchResult;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// 单字段差异标记（仅用于预览展示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub changed: bool,
    pub was_empty: bool,
}

// ==========================================
// SimulatedRecord - 提交后将存在的记录状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedRecord {
    pub status: MatchStatus,
    pub record: TargetRecord,
    pub diffs: BTreeMap<String, FieldDiff>,
    /// FORCE_NEW 且命中已有实体（主键冲突）
    pub key_collision: bool,
}

impl SimulatedRecord {
    pub fn diff(&self, field_key: &str) -> FieldDiff {
        self.diffs.get(field_key).copied().unwrap_or_default()
    }

    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.diffs
            .iter()
            .filter(|(_, d)| d.changed)
            .map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSimulator;

impl MergeSimulator {
    /// 模拟单条记录的提交结果
    ///
    /// # 参数
    /// - incoming: 标准化后的导入记录
    /// - match_result: 实体匹配结果
    /// - strategy: 重复处理策略
    /// - allowed_fields: 允许更新的字段（不含主键）
    pub fn simulate(
        &self,
        incoming: &TargetRecord,
        match_result: &MatchResult,
        strategy: DuplicateStrategy,
        allowed_fields: &BTreeSet<String>,
    ) -> SimulatedRecord {
        let existing = match_result.matched_entity.as_ref();

        let (status, record) = match (strategy, existing) {
            (DuplicateStrategy::ForceNew, _) | (_, None) => (MatchStatus::New, incoming.clone()),
            (DuplicateStrategy::SkipExisting, Some(entity)) => (MatchStatus::Skip, entity.clone()),
            (DuplicateStrategy::MergeUpdate, Some(entity)) => {
                (MatchStatus::Update, merge(entity, incoming, allowed_fields))
            }
        };

        let diffs = record
            .field_keys()
            .map(|key| {
                let prior = existing.and_then(|e| e.get(key));
                let current = record.get(key);
                let diff = FieldDiff {
                    changed: trimmed(current.as_deref()) != trimmed(prior.as_deref()),
                    was_empty: is_blank(prior.as_deref()),
                };
                (key.to_string(), diff)
            })
            .collect();

        SimulatedRecord {
            status,
            record,
            diffs,
            key_collision: strategy == DuplicateStrategy::ForceNew && existing.is_some(),
        }
    }
}

fn trimmed(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or("")
}

/// 以已有实体为底，非空导入值覆盖允许字段
fn merge(
    existing: &TargetRecord,
    incoming: &TargetRecord,
    allowed_fields: &BTreeSet<String>,
) -> TargetRecord {
    let mut merged = existing.clone();
    for field in allowed_fields {
        if let Some(value) = incoming.get(field) {
            if !value.trim().is_empty() {
                merged.set(field, &value);
            }
        }
    }
    merged
}
