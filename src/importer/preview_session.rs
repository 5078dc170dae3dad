// ==========================================
// 学校档案管理系统 - 预览会话
// ==========================================
// 职责: 汇总全部已分析行，管理删除/选择/排序，实时统计
// 红线:
// - 模拟结果与统计每次调用时由 MergeSimulator 重新计算，不做缓存
// - 已删除行永不参与提交，也不受全选切换影响
// - 排序比较的是模拟后的值
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::domain::types::{DuplicateStrategy, MatchStatus, TargetSchema};
use crate::importer::entity_matcher::MatchResult;
use crate::importer::merge_simulator::{MergeSimulator, SimulatedRecord};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

// ==========================================
// PreviewRow - 预览行（计算视图）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub normalized_record: NormalizedRecord,
    pub match_result: MatchResult,
    pub simulated_record: SimulatedRecord,
    pub original_index: usize,
    pub removed: bool,
    pub selected: bool,
}

impl PreviewRow {
    pub fn status(&self) -> MatchStatus {
        self.simulated_record.status
    }
}

/// 预览统计（NEW/UPDATE/SKIP 仅统计未删除行）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub new: usize,
    pub update: usize,
    pub skip: usize,
    pub total: usize,
    pub selected: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone)]
struct PreviewEntry {
    normalized: NormalizedRecord,
    match_result: MatchResult,
}

impl PreviewEntry {
    fn original_index(&self) -> usize {
        self.normalized.origin_index
    }
}

// ==========================================
// PreviewSession
// ==========================================
#[derive(Debug, Clone)]
pub struct PreviewSession {
    schema: TargetSchema,
    primary_key: String,
    entries: Vec<PreviewEntry>,
    removed: BTreeSet<usize>,
    selected: BTreeSet<usize>,
    strategy: DuplicateStrategy,
    allowed_fields: BTreeSet<String>,
    sort: Option<SortSpec>,
    simulator: MergeSimulator,
}

impl PreviewSession {
    /// 创建预览会话（默认全选）
    ///
    /// # 参数
    /// - schema: 目标模式
    /// - primary_key: 学生主键字段（从允许更新字段中剔除）
    /// - matched: 实体匹配输出
    /// - strategy: 初始重复处理策略
    /// - allowed_fields: 初始允许更新字段
    pub fn new(
        schema: TargetSchema,
        primary_key: &str,
        matched: Vec<(NormalizedRecord, MatchResult)>,
        strategy: DuplicateStrategy,
        allowed_fields: BTreeSet<String>,
    ) -> Self {
        let entries: Vec<PreviewEntry> = matched
            .into_iter()
            .map(|(normalized, match_result)| PreviewEntry {
                normalized,
                match_result,
            })
            .collect();
        let selected = entries.iter().map(PreviewEntry::original_index).collect();

        let mut session = Self {
            schema,
            primary_key: primary_key.to_string(),
            entries,
            removed: BTreeSet::new(),
            selected,
            strategy,
            allowed_fields: BTreeSet::new(),
            sort: None,
            simulator: MergeSimulator,
        };
        session.set_allowed_fields(allowed_fields);
        session
    }

    pub fn schema(&self) -> TargetSchema {
        self.schema
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn strategy(&self) -> DuplicateStrategy {
        self.strategy
    }

    pub fn allowed_fields(&self) -> &BTreeSet<String> {
        &self.allowed_fields
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_strategy(&mut self, strategy: DuplicateStrategy) {
        debug!(strategy = %strategy, "切换重复处理策略");
        self.strategy = strategy;
    }

    /// 设置允许更新字段（主键始终剔除）
    pub fn set_allowed_fields(&mut self, fields: BTreeSet<String>) {
        self.allowed_fields = fields
            .into_iter()
            .filter(|f| f != &self.primary_key)
            .collect();
    }

    fn is_known(&self, index: usize) -> bool {
        self.entries.iter().any(|e| e.original_index() == index)
    }

    /// 切换单行选择
    ///
    /// # 返回
    /// 切换后的选择状态；已删除或不存在的行返回 false 且不变
    pub fn toggle_row(&mut self, index: usize) -> bool {
        if self.removed.contains(&index) || !self.is_known(index) {
            return false;
        }
        if self.selected.remove(&index) {
            false
        } else {
            self.selected.insert(index);
            true
        }
    }

    /// 全选切换，仅作用于当前可见（未删除）行
    ///
    /// 可见行全部已选 → 全部取消；否则 → 全部选中
    pub fn toggle_select_all(&mut self) {
        let visible: Vec<usize> = self
            .entries
            .iter()
            .map(PreviewEntry::original_index)
            .filter(|i| !self.removed.contains(i))
            .collect();

        let all_selected = visible.iter().all(|i| self.selected.contains(i));
        for index in visible {
            if all_selected {
                self.selected.remove(&index);
            } else {
                self.selected.insert(index);
            }
        }
    }

    /// 删除全部已选行（移入 removed 并清空选择）
    ///
    /// # 返回
    /// 本次删除的行数
    pub fn remove_selected(&mut self) -> usize {
        let moved = std::mem::take(&mut self.selected);
        let count = moved.len();
        self.removed.extend(moved);
        debug!(count, removed_total = self.removed.len(), "删除已选行");
        count
    }

    /// 按字段排序；对同一字段再次排序时反转方向
    pub fn sort_by(&mut self, field: &str) {
        let direction = match &self.sort {
            Some(spec) if spec.field == field && spec.direction == SortDirection::Asc => {
                SortDirection::Desc
            }
            _ => SortDirection::Asc,
        };
        self.sort = Some(SortSpec {
            field: field.to_string(),
            direction,
        });
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    fn simulate(&self, entry: &PreviewEntry) -> SimulatedRecord {
        self.simulator.simulate(
            &entry.normalized.record,
            &entry.match_result,
            self.strategy,
            &self.allowed_fields,
        )
    }

    fn build_row(&self, entry: &PreviewEntry) -> PreviewRow {
        let index = entry.original_index();
        PreviewRow {
            normalized_record: entry.normalized.clone(),
            match_result: entry.match_result.clone(),
            simulated_record: self.simulate(entry),
            original_index: index,
            removed: self.removed.contains(&index),
            selected: self.selected.contains(&index),
        }
    }

    /// 全部行（含已删除），原始顺序
    pub fn all_rows(&self) -> Vec<PreviewRow> {
        self.entries.iter().map(|e| self.build_row(e)).collect()
    }

    /// 可见行（未删除），按当前排序
    pub fn visible_rows(&self) -> Vec<PreviewRow> {
        let mut rows: Vec<PreviewRow> = self
            .entries
            .iter()
            .filter(|e| !self.removed.contains(&e.original_index()))
            .map(|e| self.build_row(e))
            .collect();

        if let Some(spec) = &self.sort {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.simulated_record.record.get(&spec.field).as_deref(),
                    b.simulated_record.record.get(&spec.field).as_deref(),
                );
                let ord = match spec.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                ord.then(a.original_index.cmp(&b.original_index))
            });
        }
        rows
    }

    /// 实时统计
    pub fn summary(&self) -> PreviewSummary {
        let mut summary = PreviewSummary {
            total: self.entries.len(),
            selected: self.selected.len(),
            removed: self.removed.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            if self.removed.contains(&entry.original_index()) {
                continue;
            }
            match self.simulate(entry).status {
                MatchStatus::New => summary.new += 1,
                MatchStatus::Update => summary.update += 1,
                MatchStatus::Skip => summary.skip += 1,
            }
        }
        summary
    }

    /// 待提交行: 未删除且已选，原始顺序
    pub fn commit_candidates(&self) -> Vec<PreviewRow> {
        self.entries
            .iter()
            .filter(|e| {
                let i = e.original_index();
                !self.removed.contains(&i) && self.selected.contains(&i)
            })
            .map(|e| self.build_row(e))
            .collect()
    }
}

/// 两侧均可解析为数字时按数值比较，否则按字符串比较；空值排在最前
fn compare_values(a: Option<&str>, b: Option<&str>) -> Ordering {
    let a = a.map(str::trim).unwrap_or("");
    let b = b.map(str::trim).unwrap_or("");
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}
