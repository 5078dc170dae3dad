// ==========================================
// 学校档案管理系统 - 行标准化器
// ==========================================
// 职责: 按列映射将原始行转换为类型化目标记录
// 规则:
// - 学生: 姓名与主键 TRIM 后均非空，否则丢弃该行（计入跳过数）
// - 成绩: 需要学生关联字段（主键或姓名）及分数
// - 考勤: 需要学生关联字段；状态与日期按解析器链处理
// ID: 新记录使用 时间戳+随机后缀；成绩/考勤在关联学生后使用复合键
// ==========================================

use crate::domain::record::{
    AttendanceRecord, CellValue, NormalizedRecord, PerformanceRecord, RawRow, StudentRecord,
    TargetRecord, DATE_FORMAT,
};
use crate::domain::schema::field_keys as k;
use crate::domain::types::TargetSchema;
use crate::importer::column_mapper::ColumnMapping;
use crate::importer::data_cleaner::{DataCleaner, DEFAULT_MAX_SCORE};
use chrono::{NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

/// 生成合成记录 ID（毫秒时间戳 + 随机后缀）
pub fn generate_record_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix.to_lowercase())
}

fn key_part(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// 成绩复合键: 学生 + 科目 + 评估（无评估名称时使用日期）
pub fn performance_record_id(record: &PerformanceRecord) -> String {
    let assessment = match record.title.as_deref() {
        Some(title) if !title.trim().is_empty() => key_part(title),
        _ => record.date.format(DATE_FORMAT).to_string(),
    };
    format!(
        "{}_{}_{}",
        record.student_id,
        key_part(record.subject.as_deref().unwrap_or("")),
        assessment
    )
}

/// 考勤复合键: 学生 + 日期
pub fn attendance_record_id(record: &AttendanceRecord) -> String {
    format!("{}_{}", record.student_id, record.date.format(DATE_FORMAT))
}

// ==========================================
// NormalizationOutcome - 标准化结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationOutcome {
    pub records: Vec<NormalizedRecord>,
    /// 被丢弃的原始行序号
    pub skipped: Vec<usize>,
}

impl NormalizationOutcome {
    pub fn skipped_rows(&self) -> usize {
        self.skipped.len()
    }
}

// ==========================================
// RowNormalizer
// ==========================================
pub struct RowNormalizer<'a> {
    mapping: &'a ColumnMapping,
    primary_key: &'a str,
    import_date: NaiveDate,
    default_max_score: f64,
    cleaner: DataCleaner,
    next_id: fn() -> String,
}

impl<'a> RowNormalizer<'a> {
    /// 创建标准化器
    ///
    /// # 参数
    /// - mapping: 列映射
    /// - primary_key: 学生主键字段（如 nationalId）
    /// - import_date: 导入日期（日期解析失败时的回退值）
    pub fn new(mapping: &'a ColumnMapping, primary_key: &'a str, import_date: NaiveDate) -> Self {
        Self {
            mapping,
            primary_key,
            import_date,
            default_max_score: DEFAULT_MAX_SCORE,
            cleaner: DataCleaner,
            next_id: generate_record_id,
        }
    }

    pub fn with_default_max_score(mut self, max_score: f64) -> Self {
        self.default_max_score = max_score;
        self
    }

    pub fn with_id_generator(mut self, next_id: fn() -> String) -> Self {
        self.next_id = next_id;
        self
    }

    /// 标准化全部行
    pub fn normalize_all(&self, rows: &[RawRow]) -> NormalizationOutcome {
        let mut outcome = NormalizationOutcome::default();
        for row in rows {
            match self.normalize(row) {
                Some(record) => outcome.records.push(record),
                None => {
                    debug!(row = row.index, "行被丢弃");
                    outcome.skipped.push(row.index);
                }
            }
        }
        info!(
            schema = %self.mapping.schema,
            accepted = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "行标准化完成"
        );
        outcome
    }

    /// 标准化单行（0 或 1 条记录）
    pub fn normalize(&self, row: &RawRow) -> Option<NormalizedRecord> {
        let record = match self.mapping.schema {
            TargetSchema::Students => TargetRecord::Student(self.normalize_student(row)?),
            TargetSchema::Performance => {
                TargetRecord::Performance(self.normalize_performance(row)?)
            }
            TargetSchema::Attendance => TargetRecord::Attendance(self.normalize_attendance(row)?),
        };
        Some(NormalizedRecord {
            origin_index: row.index,
            record,
        })
    }

    fn cell<'r>(&self, row: &'r RawRow, field_key: &str) -> Option<&'r CellValue> {
        self.mapping.get(field_key).and_then(|header| row.get(header))
    }

    fn text(&self, row: &RawRow, field_key: &str) -> Option<String> {
        self.cleaner.clean_text(self.cell(row, field_key))
    }

    fn identifier(&self, row: &RawRow, field_key: &str) -> Option<String> {
        self.cleaner.clean_identifier(self.cell(row, field_key))
    }

    fn normalize_student(&self, row: &RawRow) -> Option<StudentRecord> {
        let name = self.text(row, k::NAME)?;
        // 主键必须非空
        self.identifier(row, self.primary_key)?;

        Some(StudentRecord {
            id: (self.next_id)(),
            national_id: self.identifier(row, k::NATIONAL_ID),
            student_number: self.identifier(row, k::STUDENT_NUMBER),
            name,
            grade_level: self.text(row, k::GRADE_LEVEL),
            class_name: self.text(row, k::CLASS_NAME),
            gender: self.text(row, k::GENDER),
            birth_date: self.cleaner.parse_optional_date(self.cell(row, k::BIRTH_DATE)),
            phone: self.identifier(row, k::PHONE),
            parent_name: self.text(row, k::PARENT_NAME),
            parent_phone: self.identifier(row, k::PARENT_PHONE),
            email: self.text(row, k::EMAIL),
            address: self.text(row, k::ADDRESS),
            notes: self.text(row, k::NOTES),
        })
    }

    fn normalize_performance(&self, row: &RawRow) -> Option<PerformanceRecord> {
        let national_id = self.identifier(row, k::NATIONAL_ID);
        let student_name = self.text(row, k::STUDENT_NAME);
        if national_id.is_none() && student_name.is_none() {
            return None;
        }

        let score_cell = self.cell(row, k::SCORE).filter(|c| !c.is_blank())?;
        let score = self.cleaner.parse_score(
            score_cell,
            self.cell(row, k::MAX_SCORE),
            self.default_max_score,
        );

        Some(PerformanceRecord {
            id: String::new(),
            student_id: String::new(),
            national_id,
            student_name,
            subject: self.text(row, k::SUBJECT),
            title: self.text(row, k::TITLE),
            score: score.score,
            max_score: score.max_score,
            date: self
                .cleaner
                .parse_date_or(self.cell(row, k::DATE), self.import_date),
            notes: self.text(row, k::NOTES),
        })
    }

    fn normalize_attendance(&self, row: &RawRow) -> Option<AttendanceRecord> {
        let national_id = self.identifier(row, k::NATIONAL_ID);
        let student_name = self.text(row, k::STUDENT_NAME);
        if national_id.is_none() && student_name.is_none() {
            return None;
        }

        Some(AttendanceRecord {
            id: String::new(),
            student_id: String::new(),
            national_id,
            student_name,
            date: self
                .cleaner
                .parse_date_or(self.cell(row, k::DATE), self.import_date),
            status: self.cleaner.parse_attendance_status(self.cell(row, k::STATUS)),
            notes: self.text(row, k::NOTES),
        })
    }
}
