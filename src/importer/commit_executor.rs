// ==========================================
// 学校档案管理系统 - 提交执行器
// ==========================================
// 职责: 将最终选中的预览行（未删除且已选）交给存储层
// - 学生: upsert_students（按主键 + 策略）
// - 成绩/考勤: 批量写入模拟结果中状态非 SKIP 的记录
// 红线: 不做部分回滚；存储失败 → 单一 CommitFailed，会话状态不变
// ==========================================

use crate::domain::record::TargetRecord;
use crate::domain::types::{MatchStatus, TargetSchema};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::preview_session::PreviewSession;
use crate::repository::record_store::{RecordStore, StoreWriteSummary};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub schema: TargetSchema,
    /// 发送给存储层的记录数
    pub rows_sent: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl CommitReport {
    fn from_summary(schema: TargetSchema, rows_sent: usize, summary: StoreWriteSummary) -> Self {
        Self {
            schema,
            rows_sent,
            inserted: summary.inserted,
            updated: summary.updated,
            skipped: summary.skipped,
        }
    }
}

// ==========================================
// CommitExecutor
// ==========================================
pub struct CommitExecutor<R>
where
    R: RecordStore + ?Sized,
{
    store: Arc<R>,
}

impl<R> CommitExecutor<R>
where
    R: RecordStore + ?Sized,
{
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// 提交会话中的待提交行
    ///
    /// # 返回
    /// - Ok(CommitReport): 存储层返回的写入统计
    /// - Err(CommitFailed): 存储层错误（汇总）
    #[instrument(skip(self, session), fields(schema = %session.schema(), strategy = %session.strategy()))]
    pub async fn commit(&self, session: &PreviewSession) -> ImportResult<CommitReport> {
        let candidates = session.commit_candidates();
        info!(candidates = candidates.len(), "开始提交");

        let result = match session.schema() {
            TargetSchema::Students => {
                let records: Vec<_> = candidates
                    .into_iter()
                    .filter_map(|row| match row.normalized_record.record {
                        TargetRecord::Student(student) => Some(student),
                        _ => None,
                    })
                    .collect();
                let sent = records.len();
                self.store
                    .upsert_students(
                        records,
                        session.primary_key(),
                        session.strategy(),
                        session.allowed_fields(),
                    )
                    .await
                    .map(|summary| CommitReport::from_summary(TargetSchema::Students, sent, summary))
            }
            TargetSchema::Performance => {
                let (records, skipped) = split_skipped(candidates.into_iter().map(|row| {
                    (row.simulated_record.status, row.simulated_record.record)
                }));
                let records: Vec<_> = records
                    .into_iter()
                    .filter_map(|record| match record {
                        TargetRecord::Performance(perf) => Some(perf),
                        _ => None,
                    })
                    .collect();
                let sent = records.len();
                self.store.insert_performance(records).await.map(|summary| {
                    let mut report =
                        CommitReport::from_summary(TargetSchema::Performance, sent, summary);
                    report.skipped += skipped;
                    report
                })
            }
            TargetSchema::Attendance => {
                let (records, skipped) = split_skipped(candidates.into_iter().map(|row| {
                    (row.simulated_record.status, row.simulated_record.record)
                }));
                let records: Vec<_> = records
                    .into_iter()
                    .filter_map(|record| match record {
                        TargetRecord::Attendance(att) => Some(att),
                        _ => None,
                    })
                    .collect();
                let sent = records.len();
                self.store.insert_attendance(records).await.map(|summary| {
                    let mut report =
                        CommitReport::from_summary(TargetSchema::Attendance, sent, summary);
                    report.skipped += skipped;
                    report
                })
            }
        };

        match result {
            Ok(report) => {
                info!(
                    rows_sent = report.rows_sent,
                    inserted = report.inserted,
                    updated = report.updated,
                    skipped = report.skipped,
                    "提交完成"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "提交失败");
                Err(ImportError::CommitFailed(e.to_string()))
            }
        }
    }
}

/// 剔除 SKIP 行，返回（待写入记录, 跳过数）
fn split_skipped<I>(rows: I) -> (Vec<TargetRecord>, usize)
where
    I: Iterator<Item = (MatchStatus, TargetRecord)>,
{
    let mut skipped = 0;
    let records = rows
        .filter_map(|(status, record)| {
            if status == MatchStatus::Skip {
                skipped += 1;
                None
            } else {
                Some(record)
            }
        })
        .collect();
    (records, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{AttendanceRecord, ExistingEntity, NormalizedRecord, PerformanceRecord, StudentRecord};
    use crate::domain::types::{AttendanceStatus, DuplicateStrategy};
    use crate::importer::entity_matcher::MatchResult;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// 记录调用参数的存储桩
    #[derive(Default)]
    struct RecordingStore {
        students: Mutex<Vec<StudentRecord>>,
        attendance: Mutex<Vec<AttendanceRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn list_existing(&self, _schema: TargetSchema) -> RepositoryResult<Vec<ExistingEntity>> {
            Ok(vec![])
        }

        async fn upsert_students(
            &self,
            records: Vec<StudentRecord>,
            _primary_key: &str,
            _strategy: DuplicateStrategy,
            _allowed_fields: &BTreeSet<String>,
        ) -> RepositoryResult<StoreWriteSummary> {
            if self.fail {
                return Err(RepositoryError::DatabaseQueryError("disk full".into()));
            }
            let count = records.len();
            self.students.lock().unwrap().extend(records);
            Ok(StoreWriteSummary {
                inserted: count,
                ..Default::default()
            })
        }

        async fn insert_performance(
            &self,
            records: Vec<PerformanceRecord>,
        ) -> RepositoryResult<StoreWriteSummary> {
            Ok(StoreWriteSummary {
                inserted: records.len(),
                ..Default::default()
            })
        }

        async fn insert_attendance(
            &self,
            records: Vec<AttendanceRecord>,
        ) -> RepositoryResult<StoreWriteSummary> {
            let count = records.len();
            self.attendance.lock().unwrap().extend(records);
            Ok(StoreWriteSummary {
                inserted: count,
                ..Default::default()
            })
        }
    }

    fn student_row(i: usize) -> (NormalizedRecord, MatchResult) {
        (
            NormalizedRecord {
                origin_index: i,
                record: TargetRecord::Student(StudentRecord {
                    id: format!("tmp{}", i),
                    national_id: Some(format!("{}", i)),
                    name: format!("Student {}", i),
                    ..Default::default()
                }),
            },
            MatchResult::new_record(),
        )
    }

    #[tokio::test]
    async fn test_commit_sends_only_selected_rows() {
        let store = Arc::new(RecordingStore::default());
        let mut session = PreviewSession::new(
            TargetSchema::Students,
            "nationalId",
            (0..4).map(student_row).collect(),
            DuplicateStrategy::MergeUpdate,
            BTreeSet::new(),
        );
        session.toggle_row(1);
        session.toggle_row(1);
        session.toggle_select_all(); // 全部取消
        session.toggle_row(0);
        session.toggle_row(3);

        let report = CommitExecutor::new(store.clone()).commit(&session).await.unwrap();
        assert_eq!(report.rows_sent, 2);
        assert_eq!(report.inserted, 2);
        let names: Vec<String> = store.students.lock().unwrap().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["Student 0", "Student 3"]);
    }

    #[tokio::test]
    async fn test_attendance_skip_rows_are_not_sent() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let att = |status| AttendanceRecord {
            id: "s1_2024-10-01".into(),
            student_id: "s1".into(),
            national_id: Some("123".into()),
            student_name: None,
            date,
            status,
            notes: None,
        };
        let rows = vec![(
            NormalizedRecord {
                origin_index: 0,
                record: TargetRecord::Attendance(att(AttendanceStatus::Absent)),
            },
            MatchResult::matched(TargetRecord::Attendance(att(AttendanceStatus::Present))),
        )];
        let session = PreviewSession::new(
            TargetSchema::Attendance,
            "nationalId",
            rows,
            DuplicateStrategy::SkipExisting,
            BTreeSet::new(),
        );

        let store = Arc::new(RecordingStore::default());
        let report = CommitExecutor::new(store.clone()).commit(&session).await.unwrap();
        assert_eq!(report.rows_sent, 0);
        assert_eq!(report.skipped, 1);
        assert!(store.attendance.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_aggregated() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let session = PreviewSession::new(
            TargetSchema::Students,
            "nationalId",
            (0..2).map(student_row).collect(),
            DuplicateStrategy::MergeUpdate,
            BTreeSet::new(),
        );
        let err = CommitExecutor::new(store).commit(&session).await.unwrap_err();
        assert!(matches!(err, ImportError::CommitFailed(msg) if msg.contains("disk full")));
        assert_eq!(session.summary().selected, 2);
    }
}
