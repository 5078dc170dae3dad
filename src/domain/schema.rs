// ==========================================
// 学校档案管理系统 - 目标模式字段定义
// ==========================================
// 职责: 三类导入目标（学生/成绩/考勤）的字段表
// 说明: 字段顺序即列映射的优先级顺序
// ==========================================

use crate::domain::types::TargetSchema;
use serde::Serialize;

/// 字段键常量（camelCase，与前端/存储一致）
pub mod field_keys {
    pub const ID: &str = "id";
    pub const STUDENT_ID: &str = "studentId";

    // 学生
    pub const NATIONAL_ID: &str = "nationalId";
    pub const STUDENT_NUMBER: &str = "studentNumber";
    pub const NAME: &str = "name";
    pub const GRADE_LEVEL: &str = "gradeLevel";
    pub const CLASS_NAME: &str = "className";
    pub const GENDER: &str = "gender";
    pub const BIRTH_DATE: &str = "birthDate";
    pub const PHONE: &str = "phone";
    pub const PARENT_NAME: &str = "parentName";
    pub const PARENT_PHONE: &str = "parentPhone";
    pub const EMAIL: &str = "email";
    pub const ADDRESS: &str = "address";
    pub const NOTES: &str = "notes";

    // 成绩 / 考勤
    pub const STUDENT_NAME: &str = "studentName";
    pub const SUBJECT: &str = "subject";
    pub const TITLE: &str = "title";
    pub const SCORE: &str = "score";
    pub const MAX_SCORE: &str = "maxScore";
    pub const DATE: &str = "date";
    pub const STATUS: &str = "status";
}

use field_keys as k;

// ==========================================
// FieldDefinition - 目标字段定义
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub is_unique_candidate: bool,
}

const fn field(key: &'static str, label: &'static str) -> FieldDefinition {
    FieldDefinition {
        key,
        label,
        required: false,
        is_unique_candidate: false,
    }
}

const fn required(key: &'static str, label: &'static str) -> FieldDefinition {
    FieldDefinition {
        key,
        label,
        required: true,
        is_unique_candidate: false,
    }
}

const fn unique(key: &'static str, label: &'static str) -> FieldDefinition {
    FieldDefinition {
        key,
        label,
        required: false,
        is_unique_candidate: true,
    }
}

static STUDENT_FIELDS: [FieldDefinition; 13] = [
    unique(k::NATIONAL_ID, "رقم الهوية / National ID"),
    unique(k::STUDENT_NUMBER, "رقم الطالب / Student No."),
    required(k::NAME, "اسم الطالب / Name"),
    field(k::GRADE_LEVEL, "الصف / Grade"),
    field(k::CLASS_NAME, "الفصل / Class"),
    field(k::GENDER, "الجنس / Gender"),
    field(k::BIRTH_DATE, "تاريخ الميلاد / Birth date"),
    field(k::PARENT_PHONE, "جوال ولي الأمر / Parent phone"),
    field(k::PARENT_NAME, "اسم ولي الأمر / Parent name"),
    field(k::PHONE, "جوال الطالب / Phone"),
    field(k::EMAIL, "البريد الإلكتروني / Email"),
    field(k::ADDRESS, "العنوان / Address"),
    field(k::NOTES, "ملاحظات / Notes"),
];

static PERFORMANCE_FIELDS: [FieldDefinition; 8] = [
    unique(k::NATIONAL_ID, "رقم الهوية / National ID"),
    field(k::STUDENT_NAME, "اسم الطالب / Student name"),
    field(k::SUBJECT, "المادة / Subject"),
    field(k::TITLE, "التقييم / Assessment"),
    field(k::MAX_SCORE, "الدرجة العظمى / Max score"),
    required(k::SCORE, "الدرجة / Score"),
    field(k::DATE, "التاريخ / Date"),
    field(k::NOTES, "ملاحظات / Notes"),
];

static ATTENDANCE_FIELDS: [FieldDefinition; 5] = [
    unique(k::NATIONAL_ID, "رقم الهوية / National ID"),
    field(k::STUDENT_NAME, "اسم الطالب / Student name"),
    field(k::DATE, "التاريخ / Date"),
    required(k::STATUS, "الحالة / Status"),
    field(k::NOTES, "ملاحظات / Notes"),
];

/// 获取目标模式的字段表（按映射优先级排序）
pub fn field_definitions(schema: TargetSchema) -> &'static [FieldDefinition] {
    match schema {
        TargetSchema::Students => &STUDENT_FIELDS,
        TargetSchema::Performance => &PERFORMANCE_FIELDS,
        TargetSchema::Attendance => &ATTENDANCE_FIELDS,
    }
}

/// 查找单个字段定义
pub fn find_field(schema: TargetSchema, key: &str) -> Option<&'static FieldDefinition> {
    field_definitions(schema).iter().find(|f| f.key == key)
}

/// 成绩/考勤用于关联学生的候选字段
pub const STUDENT_LINK_FIELDS: [&str; 2] = [k::NATIONAL_ID, k::STUDENT_NAME];
