// ==========================================
// 学校档案管理系统 - 数据清洗器
// ==========================================
// 职责: TRIM / 空值标准化 / 数字归一 / 分数拆分 / 日期与考勤状态解析
// 日期解析: 按固定优先级依次尝试（ISO → Excel 序列号 → DD/MM/YYYY）
// ==========================================

use crate::domain::record::CellValue;
use crate::domain::types::AttendanceStatus;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Excel 序列号与 Unix 纪元之间的天数（1899-12-30 为第 0 天）
pub const EXCEL_EPOCH_OFFSET_DAYS: f64 = 25569.0;

const SECONDS_PER_DAY: f64 = 86400.0;

/// 默认满分
pub const DEFAULT_MAX_SCORE: f64 = 20.0;

// ==========================================
// 日期解析器（按顺序尝试）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateParser {
    /// YYYY-MM-DD（可带时间部分）/ RFC3339 / YYYY/MM/DD
    Iso,
    /// Excel 日期序列号
    ExcelSerial,
    /// DD/MM/YYYY（忽略时间部分）
    SlashDayMonthYear,
}

pub const DATE_PARSERS: [DateParser; 3] = [
    DateParser::Iso,
    DateParser::ExcelSerial,
    DateParser::SlashDayMonthYear,
];

impl DateParser {
    pub fn attempt(&self, value: &CellValue) -> Option<NaiveDate> {
        match self {
            DateParser::Iso => match value {
                CellValue::Text(s) => parse_iso_date(&fold_digits(s.trim())),
                _ => None,
            },
            DateParser::ExcelSerial => {
                let serial = match value {
                    CellValue::Number(n) => *n,
                    CellValue::Text(s) => fold_digits(s.trim()).parse::<f64>().ok()?,
                    CellValue::Blank => return None,
                };
                excel_serial_to_date(serial)
            }
            DateParser::SlashDayMonthYear => match value {
                CellValue::Text(s) => parse_slash_dmy(&fold_digits(s.trim())),
                _ => None,
            },
        }
    }
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y/%m/%d").ok()
}

/// Excel 序列号 → 日期（UTC）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let seconds = ((serial - EXCEL_EPOCH_OFFSET_DAYS) * SECONDS_PER_DAY).round() as i64;
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.date_naive())
}

fn parse_slash_dmy(s: &str) -> Option<NaiveDate> {
    let date_part = s.split_whitespace().next()?;
    let mut parts = date_part.split('/');
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

// ==========================================
// 考勤状态关键词（双语，先命中者优先）
// ==========================================
pub const ATTENDANCE_KEYWORDS: [(AttendanceStatus, &[&str]); 3] = [
    (
        AttendanceStatus::Absent,
        &["absent", "absence", "غائب", "غياب", "缺勤"],
    ),
    (
        AttendanceStatus::Late,
        &["late", "tardy", "متأخر", "متاخر", "تأخر", "تاخر", "迟到"],
    ),
    (
        AttendanceStatus::Excused,
        &["excused", "excuse", "permission", "مستأذن", "استئذان", "عذر", "إذن", "请假"],
    ),
];

// ==========================================
// 分数（score / maxScore）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreValue {
    pub score: f64,
    pub max_score: f64,
}

pub struct DataCleaner;

impl DataCleaner {
    /// 清洗文本字段（TRIM，空白 → None）
    pub fn clean_text(&self, value: Option<&CellValue>) -> Option<String> {
        let text = value?.as_text();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// 清洗标识类字段（数字归一 + 去除内部空白）
    pub fn clean_identifier(&self, value: Option<&CellValue>) -> Option<String> {
        let text = self.clean_text(value)?;
        let folded: String = fold_digits(&text)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if folded.is_empty() {
            None
        } else {
            Some(folded)
        }
    }

    /// 解析分数
    ///
    /// # 规则
    /// - "N/M" → score=N, max=M
    /// - max 无法解析 → default_max
    /// - score 无法解析 → 0
    pub fn parse_score(
        &self,
        score: &CellValue,
        max_score: Option<&CellValue>,
        default_max: f64,
    ) -> ScoreValue {
        let parse = |s: &str| fold_digits(s.trim()).replace(',', ".").parse::<f64>().ok();

        let (score_value, inline_max) = match score {
            CellValue::Number(n) => (Some(*n), None),
            CellValue::Text(s) => match s.split_once('/') {
                Some((left, right)) => (parse(left), Some(parse(right))),
                None => (parse(s), None),
            },
            CellValue::Blank => (None, None),
        };

        let max_value = match inline_max {
            Some(inline) => inline,
            None => max_score.and_then(|m| match m {
                CellValue::Number(n) => Some(*n),
                CellValue::Text(s) => parse(s),
                CellValue::Blank => None,
            }),
        };

        ScoreValue {
            score: score_value.filter(|v| v.is_finite()).unwrap_or(0.0),
            max_score: max_value.filter(|v| v.is_finite()).unwrap_or(default_max),
        }
    }

    /// 解析日期（全部解析器失败时返回 None）
    pub fn parse_optional_date(&self, value: Option<&CellValue>) -> Option<NaiveDate> {
        let value = value?;
        if value.is_blank() {
            return None;
        }
        DATE_PARSERS.iter().find_map(|p| p.attempt(value))
    }

    /// 解析日期（全部失败时回退到导入日期）
    pub fn parse_date_or(&self, value: Option<&CellValue>, fallback: NaiveDate) -> NaiveDate {
        self.parse_optional_date(value).unwrap_or(fallback)
    }

    /// 解析考勤状态（无匹配 → PRESENT）
    pub fn parse_attendance_status(&self, value: Option<&CellValue>) -> AttendanceStatus {
        let text = match self.clean_text(value) {
            Some(t) => t.to_lowercase(),
            None => return AttendanceStatus::Present,
        };
        ATTENDANCE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
            .map(|(status, _)| *status)
            .unwrap_or(AttendanceStatus::Present)
    }
}

/// 阿拉伯-印度数字 / 东阿拉伯-印度数字 → ASCII 数字
pub fn fold_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{066B}' => '.',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_clean_text_blank_as_none() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.clean_text(Some(&text("  "))), None);
        assert_eq!(cleaner.clean_text(None), None);
        assert_eq!(
            cleaner.clean_text(Some(&text("  value  "))),
            Some("value".to_string())
        );
    }

    #[test]
    fn test_clean_identifier_folds_arabic_digits() {
        let cleaner = DataCleaner;
        assert_eq!(
            cleaner.clean_identifier(Some(&text("١٢٣ ٤٥"))),
            Some("12345".to_string())
        );
        assert_eq!(
            cleaner.clean_identifier(Some(&CellValue::Number(1012345678.0))),
            Some("1012345678".to_string())
        );
    }

    #[test]
    fn test_parse_score_fraction() {
        let cleaner = DataCleaner;
        let v = cleaner.parse_score(&text("15/20"), None, DEFAULT_MAX_SCORE);
        assert_eq!(v, ScoreValue { score: 15.0, max_score: 20.0 });
    }

    #[test]
    fn test_parse_score_defaults() {
        let cleaner = DataCleaner;

        // max 无法解析 → 20
        let v = cleaner.parse_score(&text("12/abc"), None, DEFAULT_MAX_SCORE);
        assert_eq!(v, ScoreValue { score: 12.0, max_score: 20.0 });

        // score 无法解析 → 0
        let v = cleaner.parse_score(&text("absent"), Some(&text("50")), DEFAULT_MAX_SCORE);
        assert_eq!(v, ScoreValue { score: 0.0, max_score: 50.0 });

        // 数值单元格 + 独立满分列
        let v = cleaner.parse_score(
            &CellValue::Number(8.5),
            Some(&CellValue::Number(10.0)),
            DEFAULT_MAX_SCORE,
        );
        assert_eq!(v, ScoreValue { score: 8.5, max_score: 10.0 });
    }

    #[test]
    fn test_excel_serial_fixed_date() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        assert_eq!(excel_serial_to_date(45000.0), Some(expected));
        // 多次解析结果一致
        let cleaner = DataCleaner;
        let fallback = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        for _ in 0..3 {
            assert_eq!(
                cleaner.parse_date_or(Some(&CellValue::Number(45000.0)), fallback),
                expected
            );
        }
    }

    #[test]
    fn test_date_parser_order() {
        let cleaner = DataCleaner;
        let fallback = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();

        assert_eq!(
            cleaner.parse_date_or(Some(&text("2024-02-29")), fallback),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            cleaner.parse_date_or(Some(&text("2024-02-29T08:30:00Z")), fallback),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            cleaner.parse_date_or(Some(&text("05/03/2024 10:15")), fallback),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(
            cleaner.parse_date_or(Some(&text("٠٥/٠٣/٢٠٢٤")), fallback),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(cleaner.parse_date_or(Some(&text("yesterday")), fallback), fallback);
        assert_eq!(cleaner.parse_date_or(None, fallback), fallback);
    }

    #[test]
    fn test_attendance_status_keywords() {
        let cleaner = DataCleaner;
        assert_eq!(
            cleaner.parse_attendance_status(Some(&text("غائب"))),
            AttendanceStatus::Absent
        );
        assert_eq!(
            cleaner.parse_attendance_status(Some(&text("Late arrival"))),
            AttendanceStatus::Late
        );
        assert_eq!(
            cleaner.parse_attendance_status(Some(&text("بعذر"))),
            AttendanceStatus::Excused
        );
        // 先命中者优先: 缺勤关键词排在请假之前
        assert_eq!(
            cleaner.parse_attendance_status(Some(&text("غائب بعذر"))),
            AttendanceStatus::Absent
        );
        assert_eq!(
            cleaner.parse_attendance_status(Some(&text("حاضر"))),
            AttendanceStatus::Present
        );
        assert_eq!(cleaner.parse_attendance_status(None), AttendanceStatus::Present);
    }
}
