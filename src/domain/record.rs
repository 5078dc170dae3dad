// ==========================================
// 学校档案管理系统 - 记录领域模型
// ==========================================
// 职责: 原始行 / 标准化记录 / 已存在实体
// 红线: 记录按字段键读写，供合并模拟与排序统一访问
// ==========================================

use crate::domain::schema::{field_definitions, field_keys as k};
use crate::domain::types::{AttendanceStatus, TargetSchema};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ==========================================
// CellValue - 单元格原始值
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    #[default]
    Blank,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// 文本形式（TRIM；整数数值不带小数点）
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Blank
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// 数值格式化: 整数不带 ".0"
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// 空值判定（None 或 TRIM 后为空）
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ==========================================
// RawRow - 表格数据行（表头 → 单元格）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// 数据行序号（0 起，不含表头）
    pub index: usize,
    pub cells: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cells: HashMap::new(),
        }
    }

    pub fn with_cell(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.cells.insert(header.to_string(), value.into());
        self
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

// ==========================================
// StudentRecord - 学生档案
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub national_id: Option<String>,
    pub student_number: Option<String>,
    pub name: String,
    pub grade_level: Option<String>,
    pub class_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl StudentRecord {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            k::ID => Some(self.id.clone()),
            k::NATIONAL_ID => self.national_id.clone(),
            k::STUDENT_NUMBER => self.student_number.clone(),
            k::NAME => Some(self.name.clone()),
            k::GRADE_LEVEL => self.grade_level.clone(),
            k::CLASS_NAME => self.class_name.clone(),
            k::GENDER => self.gender.clone(),
            k::BIRTH_DATE => self.birth_date.map(|d| d.format(DATE_FORMAT).to_string()),
            k::PHONE => self.phone.clone(),
            k::PARENT_NAME => self.parent_name.clone(),
            k::PARENT_PHONE => self.parent_phone.clone(),
            k::EMAIL => self.email.clone(),
            k::ADDRESS => self.address.clone(),
            k::NOTES => self.notes.clone(),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        let slot = match key {
            k::NATIONAL_ID => &mut self.national_id,
            k::STUDENT_NUMBER => &mut self.student_number,
            k::GRADE_LEVEL => &mut self.grade_level,
            k::CLASS_NAME => &mut self.class_name,
            k::GENDER => &mut self.gender,
            k::PHONE => &mut self.phone,
            k::PARENT_NAME => &mut self.parent_name,
            k::PARENT_PHONE => &mut self.parent_phone,
            k::EMAIL => &mut self.email,
            k::ADDRESS => &mut self.address,
            k::NOTES => &mut self.notes,
            k::NAME => {
                self.name = value.trim().to_string();
                return true;
            }
            k::BIRTH_DATE => {
                return match NaiveDate::parse_from_str(value.trim(), DATE_FORMAT) {
                    Ok(d) => {
                        self.birth_date = Some(d);
                        true
                    }
                    Err(_) => false,
                };
            }
            _ => return false,
        };
        *slot = non_blank(value);
        true
    }
}

// ==========================================
// PerformanceRecord - 成绩记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub id: String,
    /// 关联学生 ID（匹配前为空）
    pub student_id: String,
    pub national_id: Option<String>,
    pub student_name: Option<String>,
    pub subject: Option<String>,
    pub title: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

impl PerformanceRecord {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            k::ID => Some(self.id.clone()),
            k::STUDENT_ID => Some(self.student_id.clone()),
            k::NATIONAL_ID => self.national_id.clone(),
            k::STUDENT_NAME => self.student_name.clone(),
            k::SUBJECT => self.subject.clone(),
            k::TITLE => self.title.clone(),
            k::SCORE => Some(format_number(self.score)),
            k::MAX_SCORE => Some(format_number(self.max_score)),
            k::DATE => Some(self.date.format(DATE_FORMAT).to_string()),
            k::NOTES => self.notes.clone(),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        match key {
            k::NATIONAL_ID => self.national_id = non_blank(value),
            k::STUDENT_NAME => self.student_name = non_blank(value),
            k::SUBJECT => self.subject = non_blank(value),
            k::TITLE => self.title = non_blank(value),
            k::NOTES => self.notes = non_blank(value),
            k::SCORE => match value.parse::<f64>() {
                Ok(v) => self.score = v,
                Err(_) => return false,
            },
            k::MAX_SCORE => match value.parse::<f64>() {
                Ok(v) => self.max_score = v,
                Err(_) => return false,
            },
            k::DATE => match NaiveDate::parse_from_str(value, DATE_FORMAT) {
                Ok(d) => self.date = d,
                Err(_) => return false,
            },
            _ => return false,
        }
        true
    }
}

// ==========================================
// AttendanceRecord - 考勤记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub national_id: Option<String>,
    pub student_name: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            k::ID => Some(self.id.clone()),
            k::STUDENT_ID => Some(self.student_id.clone()),
            k::NATIONAL_ID => self.national_id.clone(),
            k::STUDENT_NAME => self.student_name.clone(),
            k::DATE => Some(self.date.format(DATE_FORMAT).to_string()),
            k::STATUS => Some(self.status.to_db_str().to_string()),
            k::NOTES => self.notes.clone(),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        match key {
            k::NATIONAL_ID => self.national_id = non_blank(value),
            k::STUDENT_NAME => self.student_name = non_blank(value),
            k::NOTES => self.notes = non_blank(value),
            k::DATE => match NaiveDate::parse_from_str(value, DATE_FORMAT) {
                Ok(d) => self.date = d,
                Err(_) => return false,
            },
            k::STATUS => match AttendanceStatus::from_str(value) {
                Some(s) => self.status = s,
                None => return false,
            },
            _ => return false,
        }
        true
    }
}

// ==========================================
// TargetRecord - 三类目标记录的统一视图
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "record", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetRecord {
    Student(StudentRecord),
    Performance(PerformanceRecord),
    Attendance(AttendanceRecord),
}

/// 外部存储中已存在的实体
pub type ExistingEntity = TargetRecord;

impl TargetRecord {
    pub fn schema(&self) -> TargetSchema {
        match self {
            TargetRecord::Student(_) => TargetSchema::Students,
            TargetRecord::Performance(_) => TargetSchema::Performance,
            TargetRecord::Attendance(_) => TargetSchema::Attendance,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TargetRecord::Student(r) => &r.id,
            TargetRecord::Performance(r) => &r.id,
            TargetRecord::Attendance(r) => &r.id,
        }
    }

    /// 按字段键读取（文本形式）
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            TargetRecord::Student(r) => r.get(key),
            TargetRecord::Performance(r) => r.get(key),
            TargetRecord::Attendance(r) => r.get(key),
        }
    }

    /// 按字段键写入；返回是否写入成功
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match self {
            TargetRecord::Student(r) => r.set(key, value),
            TargetRecord::Performance(r) => r.set(key, value),
            TargetRecord::Attendance(r) => r.set(key, value),
        }
    }

    /// 该记录所属模式的字段键（按字段表顺序）
    pub fn field_keys(&self) -> impl Iterator<Item = &'static str> {
        field_definitions(self.schema()).iter().map(|d| d.key)
    }

    pub fn as_student(&self) -> Option<&StudentRecord> {
        match self {
            TargetRecord::Student(r) => Some(r),
            _ => None,
        }
    }
}

// ==========================================
// NormalizedRecord - 标准化记录（携带原始行号）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub origin_index: usize,
    pub record: TargetRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_text() {
        assert_eq!(CellValue::Number(1234567890.0).as_text(), "1234567890");
        assert_eq!(CellValue::Number(15.5).as_text(), "15.5");
        assert_eq!(CellValue::Text("  Ali ".into()).as_text(), "Ali");
        assert!(CellValue::Text("   ".into()).is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_student_get_set_by_key() {
        let mut record = TargetRecord::Student(StudentRecord {
            id: "s1".into(),
            name: "Ali".into(),
            ..Default::default()
        });

        assert!(record.set(k::PHONE, " 0555 "));
        assert_eq!(record.get(k::PHONE), Some("0555".to_string()));

        assert!(record.set(k::BIRTH_DATE, "2010-05-01"));
        assert_eq!(record.get(k::BIRTH_DATE), Some("2010-05-01".to_string()));
        assert!(!record.set(k::BIRTH_DATE, "not a date"));

        assert!(!record.set("unknownField", "x"));
    }

    #[test]
    fn test_performance_numeric_fields() {
        let mut record = TargetRecord::Performance(PerformanceRecord {
            id: "p1".into(),
            student_id: "s1".into(),
            national_id: None,
            student_name: None,
            subject: None,
            title: None,
            score: 15.0,
            max_score: 20.0,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            notes: None,
        });

        assert_eq!(record.get(k::SCORE), Some("15".to_string()));
        assert!(record.set(k::SCORE, "17.5"));
        assert_eq!(record.get(k::SCORE), Some("17.5".to_string()));
        assert!(!record.set(k::MAX_SCORE, "abc"));
    }
}
