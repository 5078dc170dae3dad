// ==========================================
// 学校档案管理系统 - 实体匹配器
// ==========================================
// 职责: 为标准化记录查找已存在实体
// 规则:
// - 学生: 按配置主键字段的值查找
// - 成绩/考勤: 先关联学生（行内 nationalId → 姓名精确匹配回退，
//   与学生导入所配置的主键无关），
//   再按复合键查找已存在的成绩/考勤记录
// - 多个候选时取第一个，不做歧义检测
// ==========================================

use crate::domain::record::{ExistingEntity, NormalizedRecord, TargetRecord};
use crate::domain::schema::field_keys as k;
use crate::domain::types::{MatchStatus, TargetSchema};
use crate::importer::row_normalizer::{attendance_record_id, performance_record_id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// ==========================================
// MatchResult - 匹配结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub status: MatchStatus,
    pub matched_entity: Option<ExistingEntity>,
}

impl MatchResult {
    pub fn new_record() -> Self {
        Self {
            status: MatchStatus::New,
            matched_entity: None,
        }
    }

    pub fn matched(entity: ExistingEntity) -> Self {
        Self {
            status: MatchStatus::Update,
            matched_entity: Some(entity),
        }
    }
}

/// 匹配汇总
#[derive(Debug, Clone, Default)]
pub struct MatchingOutcome {
    pub matched: Vec<(NormalizedRecord, MatchResult)>,
    /// 无法关联学生的原始行序号（成绩/考勤）
    pub unresolved: Vec<usize>,
}

/// 首次出现优先的索引
fn first_index<'e, I>(entries: I) -> HashMap<String, &'e ExistingEntity>
where
    I: Iterator<Item = (Option<String>, &'e ExistingEntity)>,
{
    let mut index = HashMap::new();
    for (key, entity) in entries {
        if let Some(key) = key.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            index.entry(key).or_insert(entity);
        }
    }
    index
}

// ==========================================
// EntityMatcher
// ==========================================
pub struct EntityMatcher<'e> {
    primary_key: String,
    students_by_key: HashMap<String, &'e ExistingEntity>,
    students_by_national_id: HashMap<String, &'e ExistingEntity>,
    students_by_name: HashMap<String, &'e ExistingEntity>,
    records_by_id: HashMap<String, &'e ExistingEntity>,
}

impl<'e> EntityMatcher<'e> {
    /// 创建匹配器
    ///
    /// # 参数
    /// - primary_key: 学生主键字段
    /// - students: 已存在学生
    /// - existing: 目标模式的已存在记录（学生导入时与 students 相同）
    pub fn new(
        primary_key: &str,
        students: &'e [ExistingEntity],
        existing: &'e [ExistingEntity],
    ) -> Self {
        Self {
            primary_key: primary_key.to_string(),
            students_by_key: first_index(students.iter().map(|s| (s.get(primary_key), s))),
            students_by_national_id: first_index(
                students.iter().map(|s| (s.get(k::NATIONAL_ID), s)),
            ),
            students_by_name: first_index(students.iter().map(|s| (s.get(k::NAME), s))),
            records_by_id: first_index(existing.iter().map(|e| (Some(e.id().to_string()), e))),
        }
    }

    /// 成绩/考勤关联学生: 按 nationalId 查找，失败时回退到姓名
    fn resolve_student(
        &self,
        national_id: Option<&str>,
        name: Option<&str>,
    ) -> Option<&'e ExistingEntity> {
        let by_national_id = national_id
            .map(str::trim)
            .and_then(|v| self.students_by_national_id.get(v).copied());
        by_national_id.or_else(|| {
            name.map(str::trim)
                .and_then(|n| self.students_by_name.get(n).copied())
        })
    }

    fn lookup_student_key(&self, key_value: Option<&str>) -> Option<&'e ExistingEntity> {
        key_value
            .map(str::trim)
            .and_then(|v| self.students_by_key.get(v).copied())
    }

    /// 关联学生并填入 studentId / 复合 ID，返回同 ID 的已存在记录
    ///
    /// 外层 None 表示无法关联学生
    fn link_student(&self, record: &mut TargetRecord) -> Option<Option<&'e ExistingEntity>> {
        let id = match record {
            TargetRecord::Performance(perf) => {
                let student = self
                    .resolve_student(perf.national_id.as_deref(), perf.student_name.as_deref())?;
                perf.student_id = student.id().to_string();
                perf.id = performance_record_id(perf);
                perf.id.clone()
            }
            TargetRecord::Attendance(att) => {
                let student = self
                    .resolve_student(att.national_id.as_deref(), att.student_name.as_deref())?;
                att.student_id = student.id().to_string();
                att.id = attendance_record_id(att);
                att.id.clone()
            }
            TargetRecord::Student(_) => return Some(None),
        };
        Some(self.records_by_id.get(&id).copied())
    }

    /// 匹配单条记录
    ///
    /// # 返回
    /// - Some((记录, 匹配结果)): 成绩/考勤已填入 studentId 与复合 ID
    /// - None: 成绩/考勤无法关联学生
    pub fn match_record(
        &self,
        mut normalized: NormalizedRecord,
    ) -> Option<(NormalizedRecord, MatchResult)> {
        let found = match normalized.record.schema() {
            TargetSchema::Students => {
                let key_value = normalized.record.get(&self.primary_key);
                self.lookup_student_key(key_value.as_deref())
            }
            _ => self.link_student(&mut normalized.record)?,
        };

        let result = match found {
            Some(entity) => MatchResult::matched(entity.clone()),
            None => MatchResult::new_record(),
        };
        Some((normalized, result))
    }

    /// 匹配全部记录
    pub fn match_all(&self, records: Vec<NormalizedRecord>) -> MatchingOutcome {
        let mut outcome = MatchingOutcome::default();
        for record in records {
            let origin = record.origin_index;
            match self.match_record(record) {
                Some(pair) => outcome.matched.push(pair),
                None => {
                    debug!(row = origin, "无法关联学生");
                    outcome.unresolved.push(origin);
                }
            }
        }
        info!(
            matched = outcome.matched.len(),
            existing = outcome
                .matched
                .iter()
                .filter(|(_, m)| m.matched_entity.is_some())
                .count(),
            unresolved = outcome.unresolved.len(),
            "实体匹配完成"
        );
        outcome
    }
}
