// ==========================================
// 提交失败集成测试
// ==========================================
// 测试目标: 存储失败时
// - 返回单一 CommitFailed
// - 向导停留在 PREVIEW_SELECT，选择与删除状态保留
// - 恢复后可直接重试
// ==========================================


use async_trait::async_trait;
use school_records_import::domain::{AttendanceRecord, PerformanceRecord, StudentRecord, TargetRecord};
use school_records_import::importer::{ImportError, ImportSettings, SourceInput};
use school_records_import::repository::{
    RecordStore, RepositoryError, RepositoryResult, StoreWriteSummary,
};
use school_records_import::{logging, DuplicateStrategy, ImportStep, SqliteRecordStore, TargetSchema};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use test_helpers::{create_test_db, wizard_with_store, write_csv};

/// 可切换故障的存储（其余操作委托给 SQLite）
struct FlakyStore {
    inner: SqliteRecordStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> RepositoryResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::DatabaseTransactionError("database is locked".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn list_existing(&self, schema: TargetSchema) -> RepositoryResult<Vec<TargetRecord>> {
        self.inner.list_existing(schema).await
    }

    async fn upsert_students(
        &self,
        records: Vec<StudentRecord>,
        primary_key: &str,
        strategy: DuplicateStrategy,
        allowed_fields: &BTreeSet<String>,
    ) -> RepositoryResult<StoreWriteSummary> {
        self.check()?;
        self.inner
            .upsert_students(records, primary_key, strategy, allowed_fields)
            .await
    }

    async fn insert_performance(
        &self,
        records: Vec<PerformanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary> {
        self.check()?;
        self.inner.insert_performance(records).await
    }

    async fn insert_attendance(
        &self,
        records: Vec<AttendanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary> {
        self.check()?;
        self.inner.insert_attendance(records).await
    }
}

#[tokio::test]
async fn test_commit_failure_preserves_selection_and_allows_retry() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();

    let store = Arc::new(FlakyStore {
        inner: SqliteRecordStore::new(&db_path).unwrap(),
        failing: AtomicBool::new(true),
    });
    let file = write_csv("National ID,Name\n1,A\n2,B\n3,C\n4,D\n5,E\n");
    let mut wizard = wizard_with_store(store.clone(), ImportSettings::default());
    wizard
        .load(&SourceInput::File(file.path().to_path_buf()), TargetSchema::Students)
        .await
        .unwrap();
    wizard.build_preview().await.unwrap();

    // 删除第 4、5 行，再只选中第 1、3 行
    {
        let session = wizard.session_mut().unwrap();
        session.toggle_select_all();
        assert!(session.toggle_row(3));
        assert!(session.toggle_row(4));
        assert_eq!(session.remove_selected(), 2);
        assert!(!session.toggle_row(3));
        session.toggle_row(0);
        session.toggle_row(2);
    }
    let before = wizard.session().unwrap().summary();
    assert_eq!((before.removed, before.selected), (2, 2));

    let err = wizard.commit().await.unwrap_err();
    assert!(matches!(&err, ImportError::CommitFailed(msg) if msg.contains("database is locked")));
    assert_eq!(wizard.step(), ImportStep::PreviewSelect);
    assert_eq!(wizard.session().unwrap().summary(), before);

    store.failing.store(false, Ordering::SeqCst);
    let report = wizard.commit().await.unwrap();
    assert_eq!(report.rows_sent, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(wizard.step(), ImportStep::Committed);

    let students = store.list_existing(TargetSchema::Students).await.unwrap();
    let names: Vec<String> = students
        .iter()
        .filter_map(|s| s.as_student().map(|s| s.name.clone()))
        .collect();
    assert_eq!(names, vec!["A", "C"]);
}
