// ==========================================
// 学校档案管理系统 - 领域类型定义
// ==========================================
// 职责: 导入引擎共用的枚举类型
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库/配置一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 目标模式 (Target Schema)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetSchema {
    Students,    // 学生档案
    Performance, // 成绩
    Attendance,  // 考勤
}

impl fmt::Display for TargetSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSchema::Students => write!(f, "STUDENTS"),
            TargetSchema::Performance => write!(f, "PERFORMANCE"),
            TargetSchema::Attendance => write!(f, "ATTENDANCE"),
        }
    }
}

impl TargetSchema {
    /// 从字符串解析（大小写不敏感）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STUDENTS" | "STUDENT" => Some(TargetSchema::Students),
            "PERFORMANCE" | "GRADES" => Some(TargetSchema::Performance),
            "ATTENDANCE" => Some(TargetSchema::Attendance),
            _ => None,
        }
    }

    /// 成绩/考勤行需要先关联到学生
    pub fn links_to_student(&self) -> bool {
        !matches!(self, TargetSchema::Students)
    }
}

// ==========================================
// 重复处理策略 (Duplicate Strategy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateStrategy {
    #[default]
    MergeUpdate,  // 合并更新（默认）
    SkipExisting, // 跳过已存在
    ForceNew,     // 强制新增
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateStrategy::MergeUpdate => write!(f, "MERGE_UPDATE"),
            DuplicateStrategy::SkipExisting => write!(f, "SKIP_EXISTING"),
            DuplicateStrategy::ForceNew => write!(f, "FORCE_NEW"),
        }
    }
}

impl DuplicateStrategy {
    /// 从字符串解析策略
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "MERGE_UPDATE" | "MERGE" => Some(DuplicateStrategy::MergeUpdate),
            "SKIP_EXISTING" | "SKIP" => Some(DuplicateStrategy::SkipExisting),
            "FORCE_NEW" | "NEW" => Some(DuplicateStrategy::ForceNew),
            _ => None,
        }
    }
}

// ==========================================
// 匹配/模拟结果状态 (Match Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    New,
    Update,
    Skip,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::New => write!(f, "NEW"),
            MatchStatus::Update => write!(f, "UPDATE"),
            MatchStatus::Skip => write!(f, "SKIP"),
        }
    }
}

impl MatchStatus {
    /// 对应的 i18n 键
    pub fn label_key(&self) -> &'static str {
        match self {
            MatchStatus::New => "status.new",
            MatchStatus::Update => "status.update",
            MatchStatus::Skip => "status.skip",
        }
    }
}

// ==========================================
// 考勤状态 (Attendance Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    #[default]
    Present, // 出勤
    Absent,  // 缺勤
    Late,    // 迟到
    Excused, // 请假
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl AttendanceStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            "LATE" => Some(AttendanceStatus::Late),
            "EXCUSED" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Excused => "EXCUSED",
        }
    }
}

// ==========================================
// 导入向导步骤 (Import Step)
// ==========================================
// UPLOAD → MAPPING → PREVIEW_SELECT → COMMITTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStep {
    Upload,
    Mapping,
    PreviewSelect,
    Committed,
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStep::Upload => write!(f, "UPLOAD"),
            ImportStep::Mapping => write!(f, "MAPPING"),
            ImportStep::PreviewSelect => write!(f, "PREVIEW_SELECT"),
            ImportStep::Committed => write!(f, "COMMITTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!(
            DuplicateStrategy::from_str("merge_update"),
            Some(DuplicateStrategy::MergeUpdate)
        );
        assert_eq!(
            DuplicateStrategy::from_str(" SKIP_EXISTING "),
            Some(DuplicateStrategy::SkipExisting)
        );
        assert_eq!(DuplicateStrategy::from_str("unknown"), None);
        assert_eq!(DuplicateStrategy::ForceNew.to_string(), "FORCE_NEW");
        assert_eq!(DuplicateStrategy::default(), DuplicateStrategy::MergeUpdate);
    }

    #[test]
    fn test_schema_serde_format() {
        let json = serde_json::to_string(&TargetSchema::Performance).unwrap();
        assert_eq!(json, "\"PERFORMANCE\"");
        assert!(TargetSchema::Attendance.links_to_student());
        assert!(!TargetSchema::Students.links_to_student());
    }

    #[test]
    fn test_attendance_status_roundtrip_db_str() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Excused,
        ] {
            assert_eq!(AttendanceStatus::from_str(status.to_db_str()), Some(status));
        }
    }
}
