// ==========================================
// 学校档案管理系统 - 档案存储 SQLite 实现
// ==========================================
// 职责: 实现 RecordStore（使用 rusqlite）
// 约束:
// - 每次批量写入在单个事务内完成，任一失败整体回滚
// - 学生写入复用 MergeSimulator，保证与预览结果一致
// - 成绩/考勤按 ID INSERT OR REPLACE，复合键重复导入即覆盖
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::record::{
    AttendanceRecord, ExistingEntity, PerformanceRecord, StudentRecord, TargetRecord,
};
use crate::domain::schema::field_keys as k;
use crate::domain::types::{AttendanceStatus, DuplicateStrategy, MatchStatus, TargetSchema};
use crate::importer::entity_matcher::MatchResult;
use crate::importer::merge_simulator::MergeSimulator;
use crate::importer::row_normalizer::generate_record_id;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{RecordStore, StoreWriteSummary};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const STUDENT_COLUMNS: &str = "id, national_id, student_number, name, grade_level, class_name, \
     gender, birth_date, phone, parent_name, parent_phone, email, address, notes";

/// 学生主键字段 → 列名（白名单）
fn student_key_column(primary_key: &str) -> Option<&'static str> {
    match primary_key {
        k::NATIONAL_ID => Some("national_id"),
        k::STUDENT_NUMBER => Some("student_number"),
        _ => None,
    }
}

fn student_from_row(row: &Row) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: row.get(0)?,
        national_id: row.get(1)?,
        student_number: row.get(2)?,
        name: row.get(3)?,
        grade_level: row.get(4)?,
        class_name: row.get(5)?,
        gender: row.get(6)?,
        birth_date: row.get(7)?,
        phone: row.get(8)?,
        parent_name: row.get(9)?,
        parent_phone: row.get(10)?,
        email: row.get(11)?,
        address: row.get(12)?,
        notes: row.get(13)?,
    })
}

fn into_student(record: TargetRecord) -> RepositoryResult<StudentRecord> {
    match record {
        TargetRecord::Student(student) => Ok(student),
        other => Err(RepositoryError::InternalError(format!(
            "期望学生记录, 实际为 {}",
            other.schema()
        ))),
    }
}

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 打开数据库并建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 使用共享连接创建（调用方负责建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn list_students(conn: &Connection) -> RepositoryResult<Vec<ExistingEntity>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM students ORDER BY rowid",
            STUDENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], |row| student_from_row(row).map(TargetRecord::Student))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_performance(conn: &Connection) -> RepositoryResult<Vec<ExistingEntity>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT p.id, p.student_id, s.national_id, s.name, p.subject, p.title,
                   p.score, p.max_score, p.date, p.notes
            FROM performance p
            LEFT JOIN students s ON s.id = p.student_id
            ORDER BY p.rowid
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TargetRecord::Performance(PerformanceRecord {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    national_id: row.get(2)?,
                    student_name: row.get(3)?,
                    subject: row.get(4)?,
                    title: row.get(5)?,
                    score: row.get(6)?,
                    max_score: row.get(7)?,
                    date: row.get(8)?,
                    notes: row.get(9)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_attendance(conn: &Connection) -> RepositoryResult<Vec<ExistingEntity>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT a.id, a.student_id, s.national_id, s.name, a.date, a.status, a.notes
            FROM attendance a
            LEFT JOIN students s ON s.id = a.student_id
            ORDER BY a.rowid
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(5)?;
                Ok(TargetRecord::Attendance(AttendanceRecord {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    national_id: row.get(2)?,
                    student_name: row.get(3)?,
                    date: row.get(4)?,
                    status: AttendanceStatus::from_str(&status).unwrap_or_default(),
                    notes: row.get(6)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 在事务中按主键查找学生（首个命中）
    fn find_student_by_key_tx(
        tx: &Transaction,
        column: &str,
        value: &str,
    ) -> RepositoryResult<Option<StudentRecord>> {
        let sql = format!(
            "SELECT {} FROM students WHERE TRIM({}) = ?1 ORDER BY rowid LIMIT 1",
            STUDENT_COLUMNS, column
        );
        let found = tx
            .query_row(&sql, params![value.trim()], student_from_row)
            .optional()?;
        Ok(found)
    }

    fn row_exists_tx(tx: &Transaction, table: &str, id: &str) -> RepositoryResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1 LIMIT 1", table);
        let found: Option<i64> = tx.query_row(&sql, params![id], |row| row.get(0)).optional()?;
        Ok(found.is_some())
    }

    fn insert_student_tx(tx: &Transaction, s: &StudentRecord) -> RepositoryResult<()> {
        tx.execute(
            &format!(
                "INSERT INTO students ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                STUDENT_COLUMNS
            ),
            params![
                s.id,
                s.national_id,
                s.student_number,
                s.name,
                s.grade_level,
                s.class_name,
                s.gender,
                s.birth_date,
                s.phone,
                s.parent_name,
                s.parent_phone,
                s.email,
                s.address,
                s.notes,
            ],
        )?;
        Ok(())
    }

    fn update_student_tx(tx: &Transaction, s: &StudentRecord) -> RepositoryResult<()> {
        let affected = tx.execute(
            r#"
            UPDATE students SET
                national_id = ?2, student_number = ?3, name = ?4, grade_level = ?5,
                class_name = ?6, gender = ?7, birth_date = ?8, phone = ?9,
                parent_name = ?10, parent_phone = ?11, email = ?12, address = ?13,
                notes = ?14, updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                s.id,
                s.national_id,
                s.student_number,
                s.name,
                s.grade_level,
                s.class_name,
                s.gender,
                s.birth_date,
                s.phone,
                s.parent_name,
                s.parent_phone,
                s.email,
                s.address,
                s.notes,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Student".to_string(),
                id: s.id.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list_existing(&self, schema: TargetSchema) -> RepositoryResult<Vec<ExistingEntity>> {
        let conn = self.lock()?;
        let entities = match schema {
            TargetSchema::Students => Self::list_students(&conn)?,
            TargetSchema::Performance => Self::list_performance(&conn)?,
            TargetSchema::Attendance => Self::list_attendance(&conn)?,
        };
        debug!(schema = %schema, count = entities.len(), "读取已存在实体");
        Ok(entities)
    }

    #[instrument(skip(self, records, allowed_fields), fields(count = records.len(), strategy = %strategy))]
    async fn upsert_students(
        &self,
        records: Vec<StudentRecord>,
        primary_key: &str,
        strategy: DuplicateStrategy,
        allowed_fields: &BTreeSet<String>,
    ) -> RepositoryResult<StoreWriteSummary> {
        let column = student_key_column(primary_key).ok_or_else(|| RepositoryError::FieldValueError {
            field: primary_key.to_string(),
            message: "不支持作为学生主键".to_string(),
        })?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let simulator = MergeSimulator;
        let mut summary = StoreWriteSummary::default();

        for record in records {
            let incoming = TargetRecord::Student(record);
            let existing = match incoming.get(primary_key) {
                Some(value) if !value.trim().is_empty() => {
                    Self::find_student_by_key_tx(&tx, column, &value)?
                }
                _ => None,
            };
            let match_result = match existing {
                Some(student) => MatchResult::matched(TargetRecord::Student(student)),
                None => MatchResult::new_record(),
            };

            let simulated = simulator.simulate(&incoming, &match_result, strategy, allowed_fields);
            match simulated.status {
                MatchStatus::New => {
                    let mut student = into_student(simulated.record)?;
                    if student.id.trim().is_empty() || Self::row_exists_tx(&tx, "students", &student.id)? {
                        student.id = generate_record_id();
                    }
                    Self::insert_student_tx(&tx, &student)?;
                    summary.inserted += 1;
                }
                MatchStatus::Update => {
                    let student = into_student(simulated.record)?;
                    Self::update_student_tx(&tx, &student)?;
                    summary.updated += 1;
                }
                MatchStatus::Skip => summary.skipped += 1,
            }
        }

        tx.commit()?;
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "学生写入完成"
        );
        Ok(summary)
    }

    async fn insert_performance(
        &self,
        records: Vec<PerformanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut summary = StoreWriteSummary::default();

        for r in &records {
            let existed = Self::row_exists_tx(&tx, "performance", &r.id)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO performance (
                    id, student_id, subject, title, score, max_score, date, notes, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
                "#,
                params![
                    r.id,
                    r.student_id,
                    r.subject,
                    r.title,
                    r.score,
                    r.max_score,
                    r.date,
                    r.notes,
                ],
            )?;
            if existed {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit()?;
        info!(inserted = summary.inserted, updated = summary.updated, "成绩写入完成");
        Ok(summary)
    }

    async fn insert_attendance(
        &self,
        records: Vec<AttendanceRecord>,
    ) -> RepositoryResult<StoreWriteSummary> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut summary = StoreWriteSummary::default();

        for r in &records {
            let existed = Self::row_exists_tx(&tx, "attendance", &r.id)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO attendance (
                    id, student_id, date, status, notes, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                "#,
                params![r.id, r.student_id, r.date, r.status.to_db_str(), r.notes],
            )?;
            if existed {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit()?;
        info!(inserted = summary.inserted, updated = summary.updated, "考勤写入完成");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> SqliteRecordStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        SqliteRecordStore::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn student(id: &str, national_id: &str, name: &str) -> StudentRecord {
        StudentRecord {
            id: id.into(),
            national_id: Some(national_id.into()),
            name: name.into(),
            ..Default::default()
        }
    }

    fn allowed(fields: &[&str]) -> BTreeSet<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_upsert_students_merge_and_skip() {
        let store = store();
        let summary = store
            .upsert_students(
                vec![student("s1", "123", "Ali")],
                k::NATIONAL_ID,
                DuplicateStrategy::MergeUpdate,
                &allowed(&[k::PHONE]),
            )
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);

        let mut incoming = student("tmp", "123", "Ali");
        incoming.phone = Some("0555".into());
        let summary = store
            .upsert_students(
                vec![incoming.clone()],
                k::NATIONAL_ID,
                DuplicateStrategy::MergeUpdate,
                &allowed(&[k::PHONE]),
            )
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);

        let existing = store.list_existing(TargetSchema::Students).await.unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].id(), "s1");
        assert_eq!(existing[0].get(k::PHONE), Some("0555".to_string()));

        let summary = store
            .upsert_students(
                vec![incoming],
                k::NATIONAL_ID,
                DuplicateStrategy::SkipExisting,
                &allowed(&[k::PHONE]),
            )
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_force_new_inserts_duplicate_key() {
        let store = store();
        store
            .upsert_students(
                vec![student("s1", "123", "Ali")],
                k::NATIONAL_ID,
                DuplicateStrategy::MergeUpdate,
                &BTreeSet::new(),
            )
            .await
            .unwrap();
        // 同 ID 同主键: 强制新增时重新生成 ID
        let summary = store
            .upsert_students(
                vec![student("s1", "123", "Ali 2")],
                k::NATIONAL_ID,
                DuplicateStrategy::ForceNew,
                &BTreeSet::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.list_existing(TargetSchema::Students).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_primary_key_is_rejected() {
        let store = store();
        let err = store
            .upsert_students(vec![], k::PHONE, DuplicateStrategy::MergeUpdate, &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }

    #[tokio::test]
    async fn test_attendance_replace_by_compound_id() {
        let store = store();
        store
            .upsert_students(
                vec![student("s1", "123", "Ali")],
                k::NATIONAL_ID,
                DuplicateStrategy::MergeUpdate,
                &BTreeSet::new(),
            )
            .await
            .unwrap();

        let mut record = AttendanceRecord {
            id: "s1_2024-10-01".into(),
            student_id: "s1".into(),
            national_id: None,
            student_name: None,
            date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            status: AttendanceStatus::Absent,
            notes: None,
        };
        let first = store.insert_attendance(vec![record.clone()]).await.unwrap();
        assert_eq!(first.inserted, 1);

        record.status = AttendanceStatus::Late;
        let second = store.insert_attendance(vec![record]).await.unwrap();
        assert_eq!(second.updated, 1);

        let existing = store.list_existing(TargetSchema::Attendance).await.unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].get(k::STATUS), Some("LATE".to_string()));
        assert_eq!(existing[0].get(k::NATIONAL_ID), Some("123".to_string()));
    }

    #[tokio::test]
    async fn test_performance_requires_existing_student() {
        let store = store();
        let record = PerformanceRecord {
            id: "ghost_math_quiz".into(),
            student_id: "ghost".into(),
            national_id: None,
            student_name: None,
            subject: Some("Math".into()),
            title: Some("Quiz".into()),
            score: 15.0,
            max_score: 20.0,
            date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            notes: None,
        };
        let err = store.insert_performance(vec![record]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
    }
}
