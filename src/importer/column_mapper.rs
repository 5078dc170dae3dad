// ==========================================
// 学校档案管理系统 - 列映射器
// ==========================================
// 职责: 根据表头文本推断 目标字段 → 源列 的映射
// 规则: 按字段表优先级逐个字段查找；取文件列顺序中第一个
//       "包含任一包含词 且 不包含任一排除词" 的表头
// 说明: 关键词策略表为只读配置，由调用方传入
// ==========================================

use crate::domain::schema::{field_definitions, field_keys as k, STUDENT_LINK_FIELDS};
use crate::domain::types::TargetSchema;
use crate::i18n;
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

// ==========================================
// KeywordPolicy - 单字段关键词策略
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct KeywordPolicy {
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

impl KeywordPolicy {
    /// 大小写不敏感的子串匹配
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        if header.is_empty() {
            return false;
        }
        let hit = |kw: &&str| header.contains(&kw.to_lowercase());
        self.include.iter().any(hit) && !self.exclude.iter().any(hit)
    }
}

const PARENT_TOKENS: &[&str] = &[
    "parent", "father", "mother", "guardian", "ولي", "الأب", "الاب", "الأم", "الام", "والد",
];

const NAME_EXCLUDE: &[&str] = &[
    "parent", "father", "mother", "guardian", "ولي", "الأب", "الاب", "الأم", "الام", "والد",
    "teacher", "معلم", "school", "مدرسة", "subject", "مادة", "المادة", "user",
];

const NATIONAL_ID: KeywordPolicy = KeywordPolicy {
    include: &[
        "national", "identity", "id number", "iqama", "civil", "هوية", "السجل المدني", "إقامة",
        "اقامة",
    ],
    exclude: PARENT_TOKENS,
};

const NOTES: KeywordPolicy = KeywordPolicy {
    include: &["note", "remark", "comment", "ملاحظ", "تعليق"],
    exclude: &[],
};

const DATE: KeywordPolicy = KeywordPolicy {
    include: &["date", "day", "التاريخ", "تاريخ", "اليوم"],
    exclude: &["birth", "الميلاد"],
};

const STUDENT_NAME: KeywordPolicy = KeywordPolicy {
    include: &["name", "اسم", "الاسم"],
    exclude: NAME_EXCLUDE,
};

static STUDENT_POLICIES: &[(&str, KeywordPolicy)] = &[
    (k::NATIONAL_ID, NATIONAL_ID),
    (
        k::STUDENT_NUMBER,
        KeywordPolicy {
            include: &[
                "student number", "student no", "student id", "student code", "رقم الطالب",
                "الرقم الأكاديمي", "الرقم الاكاديمي", "كود الطالب",
            ],
            exclude: PARENT_TOKENS,
        },
    ),
    (k::NAME, STUDENT_NAME),
    (
        k::GRADE_LEVEL,
        KeywordPolicy {
            include: &["grade", "level", "stage", "الصف", "المرحلة", "المستوى"],
            exclude: &[],
        },
    ),
    (
        k::CLASS_NAME,
        KeywordPolicy {
            include: &["class", "section", "homeroom", "الفصل", "الشعبة", "شعبة"],
            exclude: &[],
        },
    ),
    (
        k::GENDER,
        KeywordPolicy {
            include: &["gender", "sex", "الجنس", "النوع"],
            exclude: &[],
        },
    ),
    (
        k::BIRTH_DATE,
        KeywordPolicy {
            include: &["birth", "dob", "الميلاد"],
            exclude: &[],
        },
    ),
    (
        k::PARENT_PHONE,
        KeywordPolicy {
            include: &[
                "parent phone", "parent mobile", "parent contact", "guardian phone",
                "guardian mobile", "father phone", "father mobile", "mother phone",
                "mother mobile", "جوال ولي", "هاتف ولي", "رقم ولي", "جوال الأب", "جوال الاب",
                "جوال الأم", "جوال الام",
            ],
            exclude: &[],
        },
    ),
    (
        k::PARENT_NAME,
        KeywordPolicy {
            include: &[
                "parent name", "guardian name", "father name", "mother name", "parent", "guardian",
                "ولي الأمر", "ولي الامر", "اسم ولي", "اسم الأب", "اسم الاب",
            ],
            exclude: &["phone", "mobile", "contact", "جوال", "هاتف", "رقم"],
        },
    ),
    (
        k::PHONE,
        KeywordPolicy {
            include: &["phone", "mobile", "telephone", "جوال", "هاتف", "الهاتف"],
            exclude: PARENT_TOKENS,
        },
    ),
    (
        k::EMAIL,
        KeywordPolicy {
            include: &["email", "e-mail", "mail", "البريد"],
            exclude: &[],
        },
    ),
    (
        k::ADDRESS,
        KeywordPolicy {
            include: &["address", "العنوان", "السكن", "الحي"],
            exclude: &[],
        },
    ),
    (k::NOTES, NOTES),
];

const SCORE_MAX_TOKENS: &[&str] = &[
    "max", "total", "out of", "full", "العظمى", "النهائية", "الكلية", "الكبرى",
];

static PERFORMANCE_POLICIES: &[(&str, KeywordPolicy)] = &[
    (k::NATIONAL_ID, NATIONAL_ID),
    (k::STUDENT_NAME, STUDENT_NAME),
    (
        k::SUBJECT,
        KeywordPolicy {
            include: &["subject", "course", "المادة", "مادة", "المقرر"],
            exclude: &[],
        },
    ),
    (
        k::TITLE,
        KeywordPolicy {
            include: &[
                "assessment", "assignment", "exam", "test", "quiz", "title", "الاختبار", "اختبار",
                "الواجب", "واجب", "التقييم", "عنوان",
            ],
            exclude: &[],
        },
    ),
    (
        k::MAX_SCORE,
        KeywordPolicy {
            include: SCORE_MAX_TOKENS,
            exclude: &[],
        },
    ),
    (
        k::SCORE,
        KeywordPolicy {
            include: &[
                "score", "mark", "grade", "result", "الدرجة", "درجة", "العلامة", "النتيجة",
            ],
            exclude: SCORE_MAX_TOKENS,
        },
    ),
    (k::DATE, DATE),
    (k::NOTES, NOTES),
];

static ATTENDANCE_POLICIES: &[(&str, KeywordPolicy)] = &[
    (k::NATIONAL_ID, NATIONAL_ID),
    (k::STUDENT_NAME, STUDENT_NAME),
    (k::DATE, DATE),
    (
        k::STATUS,
        KeywordPolicy {
            include: &["status", "attendance", "state", "الحالة", "حالة", "الحضور", "الغياب"],
            exclude: &[],
        },
    ),
    (k::NOTES, NOTES),
];

// ==========================================
// KeywordPolicyTable - 关键词策略表（只读）
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct KeywordPolicyTable {
    students: &'static [(&'static str, KeywordPolicy)],
    performance: &'static [(&'static str, KeywordPolicy)],
    attendance: &'static [(&'static str, KeywordPolicy)],
}

impl Default for KeywordPolicyTable {
    fn default() -> Self {
        Self {
            students: STUDENT_POLICIES,
            performance: PERFORMANCE_POLICIES,
            attendance: ATTENDANCE_POLICIES,
        }
    }
}

impl KeywordPolicyTable {
    pub fn policy(&self, schema: TargetSchema, key: &str) -> Option<&KeywordPolicy> {
        let table = match schema {
            TargetSchema::Students => self.students,
            TargetSchema::Performance => self.performance,
            TargetSchema::Attendance => self.attendance,
        };
        table.iter().find(|(k, _)| *k == key).map(|(_, p)| p)
    }
}

// ==========================================
// ColumnMapping - 字段键 → 源表头
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub schema: TargetSchema,
    entries: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new(schema: TargetSchema) -> Self {
        Self {
            schema,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, field_key: &str) -> Option<&str> {
        self.entries.get(field_key).map(String::as_str)
    }

    pub fn is_mapped(&self, field_key: &str) -> bool {
        self.entries.contains_key(field_key)
    }

    /// 人工设置/取消映射（None 或空表头 → 取消）
    pub fn set(&mut self, field_key: &str, header: Option<&str>) {
        match header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) => {
                self.entries.insert(field_key.to_string(), h.to_string());
            }
            None => {
                self.entries.remove(field_key);
            }
        }
    }

    /// 已映射字段（按字段表顺序）
    pub fn mapped_fields(&self) -> Vec<&'static str> {
        field_definitions(self.schema)
            .iter()
            .map(|d| d.key)
            .filter(|key| self.is_mapped(key))
            .collect()
    }

    /// 尚未被任何字段使用的表头（保持文件列顺序）
    pub fn unmapped_headers<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        let used: HashSet<&str> = self.entries.values().map(String::as_str).collect();
        headers
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty() && !used.contains(h))
            .collect()
    }

    /// 映射关口: 必填字段均已映射；成绩/考勤至少映射一个学生关联字段
    pub fn validate(&self, primary_key: &str) -> ImportResult<()> {
        let mut missing: Vec<String> = field_definitions(self.schema)
            .iter()
            .filter(|d| d.required && !self.is_mapped(d.key))
            .map(|d| d.label.to_string())
            .collect();

        if self.schema == TargetSchema::Students && !self.is_mapped(primary_key) {
            let label = crate::domain::schema::find_field(self.schema, primary_key)
                .map(|d| d.label)
                .unwrap_or(primary_key);
            missing.insert(0, label.to_string());
        }

        if !missing.is_empty() {
            let message =
                i18n::t_with_args("mapping.missing_required", &[("fields", &missing.join(", "))]);
            return Err(ImportError::MappingIncomplete { missing, message });
        }

        if self.schema.links_to_student()
            && !STUDENT_LINK_FIELDS.iter().any(|key| self.is_mapped(key))
        {
            return Err(ImportError::MappingIncomplete {
                missing: STUDENT_LINK_FIELDS.iter().map(|s| s.to_string()).collect(),
                message: i18n::t("mapping.missing_student_identity"),
            });
        }

        Ok(())
    }
}

// ==========================================
// ColumnMapper - 自动映射
// ==========================================
pub struct ColumnMapper<'a> {
    policies: &'a KeywordPolicyTable,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(policies: &'a KeywordPolicyTable) -> Self {
        Self { policies }
    }

    /// 推断映射（纯函数: 相同表头 → 相同结果）
    ///
    /// # 说明
    /// - 字段按字段表顺序处理，各字段独立取文件列顺序中第一个命中的表头
    /// - 同一表头可能被多个字段命中，不做冲突消解（由包含/排除词区分）
    /// - 未匹配字段保持未设置，交由人工选择
    pub fn guess(&self, headers: &[String], schema: TargetSchema) -> ColumnMapping {
        let mut mapping = ColumnMapping::new(schema);

        for definition in field_definitions(schema) {
            let Some(policy) = self.policies.policy(schema, definition.key) else {
                continue;
            };

            let found = headers
                .iter()
                .map(|h| h.trim())
                .find(|h| policy.matches(h));

            if let Some(header) = found {
                debug!(field = definition.key, header = header, "列映射命中");
                mapping.set(definition.key, Some(header));
            }
        }

        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_guess_arabic_student_headers() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let mapping = mapper.guess(
            &headers(&["رقم الهوية", "اسم الطالب", "الصف"]),
            TargetSchema::Students,
        );

        assert_eq!(mapping.get(k::NATIONAL_ID), Some("رقم الهوية"));
        assert_eq!(mapping.get(k::NAME), Some("اسم الطالب"));
        assert_eq!(mapping.get(k::GRADE_LEVEL), Some("الصف"));
        assert_eq!(mapping.mapped_fields().len(), 3);
    }

    #[test]
    fn test_student_phone_excludes_parent_columns() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let mapping = mapper.guess(
            &headers(&["Parent Phone", "Student Name", "Phone", "National ID"]),
            TargetSchema::Students,
        );

        assert_eq!(mapping.get(k::PHONE), Some("Phone"));
        assert_eq!(mapping.get(k::PARENT_PHONE), Some("Parent Phone"));
        assert_eq!(mapping.get(k::NAME), Some("Student Name"));
        assert_eq!(mapping.get(k::NATIONAL_ID), Some("National ID"));
    }

    #[test]
    fn test_guess_is_deterministic() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let hs = headers(&["الاسم", "جوال ولي الأمر", "الجوال", "الفصل", "ملاحظات"]);

        let first = mapper.guess(&hs, TargetSchema::Students);
        let second = mapper.guess(&hs, TargetSchema::Students);
        assert_eq!(first, second);
        assert_eq!(first.get(k::PARENT_PHONE), Some("جوال ولي الأمر"));
        assert_eq!(first.get(k::PHONE), Some("الجوال"));
    }

    #[test]
    fn test_score_and_max_score_disambiguation() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let mapping = mapper.guess(
            &headers(&["اسم الطالب", "الدرجة", "الدرجة العظمى", "التاريخ"]),
            TargetSchema::Performance,
        );

        assert_eq!(mapping.get(k::SCORE), Some("الدرجة"));
        assert_eq!(mapping.get(k::MAX_SCORE), Some("الدرجة العظمى"));
        assert_eq!(mapping.get(k::STUDENT_NAME), Some("اسم الطالب"));
        assert_eq!(mapping.get(k::DATE), Some("التاريخ"));
    }

    #[test]
    fn test_each_field_takes_first_matching_header() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let hs = headers(&["Grade / Class", "Class"]);
        let mapping = mapper.guess(&hs, TargetSchema::Students);

        assert_eq!(mapping.get(k::GRADE_LEVEL), Some("Grade / Class"));
        assert_eq!(mapping.get(k::CLASS_NAME), Some("Grade / Class"));
        assert_eq!(mapping.unmapped_headers(&hs), vec!["Class"]);
    }

    #[test]
    fn test_unmatched_fields_left_unset() {
        let table = KeywordPolicyTable::default();
        let mapper = ColumnMapper::new(&table);
        let hs = headers(&["foo", "bar"]);
        let mapping = mapper.guess(&hs, TargetSchema::Attendance);

        assert!(mapping.mapped_fields().is_empty());
        assert_eq!(mapping.unmapped_headers(&hs), vec!["foo", "bar"]);
    }

    #[test]
    fn test_manual_override() {
        let mut mapping = ColumnMapping::new(TargetSchema::Students);
        mapping.set(k::NAME, Some("Full"));
        assert_eq!(mapping.get(k::NAME), Some("Full"));
        mapping.set(k::NAME, None);
        assert!(!mapping.is_mapped(k::NAME));
        mapping.set(k::NAME, Some("   "));
        assert!(!mapping.is_mapped(k::NAME));
    }

    #[test]
    fn test_validate_gate() {
        let mut mapping = ColumnMapping::new(TargetSchema::Students);
        mapping.set(k::NAME, Some("Name"));
        let err = mapping.validate(k::NATIONAL_ID).unwrap_err();
        match err {
            ImportError::MappingIncomplete { missing, .. } => assert_eq!(missing.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }

        mapping.set(k::NATIONAL_ID, Some("ID"));
        assert!(mapping.validate(k::NATIONAL_ID).is_ok());

        // 成绩: score 已映射但缺少学生关联字段
        let mut perf = ColumnMapping::new(TargetSchema::Performance);
        perf.set(k::SCORE, Some("Score"));
        assert!(matches!(
            perf.validate(k::NATIONAL_ID),
            Err(ImportError::MappingIncomplete { .. })
        ));
        perf.set(k::STUDENT_NAME, Some("Name"));
        assert!(perf.validate(k::NATIONAL_ID).is_ok());
    }
}
