// ==========================================
// MergeSimulator 性质测试
// ==========================================
// 测试目标: 对多组已有/导入值组合验证
// - MERGE_UPDATE 绝不以空值覆盖已有非空字段
// - SKIP_EXISTING 命中时结果与已有实体完全一致
// - 非允许字段保持已有值
// - 模拟为纯函数（重复调用结果一致）
// ==========================================

use school_records_import::domain::schema::field_keys as k;
use school_records_import::importer::MatchResult;
use school_records_import::{DuplicateStrategy, MatchStatus, MergeSimulator, StudentRecord, TargetRecord};
use std::collections::BTreeSet;

const VALUES: [Option<&str>; 4] = [None, Some(""), Some("   "), Some("0555")];
const STRATEGIES: [DuplicateStrategy; 3] = [
    DuplicateStrategy::MergeUpdate,
    DuplicateStrategy::SkipExisting,
    DuplicateStrategy::ForceNew,
];

fn student(id: &str, phone: Option<&str>, address: Option<&str>) -> TargetRecord {
    TargetRecord::Student(StudentRecord {
        id: id.to_string(),
        national_id: Some("123".to_string()),
        name: "Ali".to_string(),
        phone: phone.map(str::to_string),
        address: address.map(str::to_string),
        ..Default::default()
    })
}

fn allowed(fields: &[&str]) -> BTreeSet<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

#[test]
fn test_merge_never_blanks_existing_values() {
    let simulator = MergeSimulator;
    let allowed = allowed(&[k::NAME, k::PHONE, k::ADDRESS]);

    for existing_phone in VALUES {
        for incoming_phone in VALUES {
            let existing = student("s1", existing_phone, Some("Riyadh"));
            let incoming = student("tmp", incoming_phone, None);
            let result = simulator.simulate(
                &incoming,
                &MatchResult::matched(existing.clone()),
                DuplicateStrategy::MergeUpdate,
                &allowed,
            );

            assert_eq!(result.status, MatchStatus::Update);
            assert_eq!(result.record.id(), "s1");
            assert_eq!(result.record.get(k::ADDRESS).as_deref(), Some("Riyadh"));

            let incoming_blank = incoming_phone.map_or(true, |v| v.trim().is_empty());
            let expected = if incoming_blank {
                existing.get(k::PHONE)
            } else {
                incoming_phone.map(str::to_string)
            };
            assert_eq!(
                result.record.get(k::PHONE),
                expected,
                "existing={:?} incoming={:?}",
                existing_phone,
                incoming_phone
            );
        }
    }
}

#[test]
fn test_skip_existing_reproduces_entity() {
    let simulator = MergeSimulator;
    let allowed = allowed(&[k::PHONE, k::ADDRESS]);

    for existing_phone in VALUES {
        for incoming_phone in VALUES {
            let existing = student("s1", existing_phone, Some("Jeddah"));
            let result = simulator.simulate(
                &student("tmp", incoming_phone, Some("Riyadh")),
                &MatchResult::matched(existing.clone()),
                DuplicateStrategy::SkipExisting,
                &allowed,
            );
            assert_eq!(result.status, MatchStatus::Skip);
            assert_eq!(result.record, existing);
            assert_eq!(result.changed_fields().count(), 0);
        }
    }
}

#[test]
fn test_fields_outside_allowed_keep_existing_values() {
    let simulator = MergeSimulator;
    let existing = student("s1", Some("0500"), Some("Jeddah"));
    let incoming = student("tmp", Some("0599"), Some("Riyadh"));

    let result = simulator.simulate(
        &incoming,
        &MatchResult::matched(existing),
        DuplicateStrategy::MergeUpdate,
        &allowed(&[k::ADDRESS]),
    );
    assert_eq!(result.record.get(k::PHONE).as_deref(), Some("0500"));
    assert_eq!(result.record.get(k::ADDRESS).as_deref(), Some("Riyadh"));
    assert!(result.diff(k::ADDRESS).changed);
    assert!(!result.diff(k::PHONE).changed);
}

#[test]
fn test_unmatched_rows_are_new_for_every_strategy() {
    let simulator = MergeSimulator;
    let incoming = student("tmp", Some("0555"), None);

    for strategy in STRATEGIES {
        let result = simulator.simulate(
            &incoming,
            &MatchResult::new_record(),
            strategy,
            &allowed(&[k::PHONE]),
        );
        assert_eq!(result.status, MatchStatus::New);
        assert_eq!(result.record, incoming);
        assert!(!result.key_collision);
        assert!(result.diff(k::PHONE).was_empty);
    }
}

#[test]
fn test_simulation_is_repeatable() {
    let simulator = MergeSimulator;
    let existing = MatchResult::matched(student("s1", None, Some("Jeddah")));
    let incoming = student("tmp", Some("0555"), Some(""));
    let allowed = allowed(&[k::PHONE, k::ADDRESS]);

    for strategy in STRATEGIES {
        let first = simulator.simulate(&incoming, &existing, strategy, &allowed);
        let second = simulator.simulate(&incoming, &existing, strategy, &allowed);
        assert_eq!(first, second);
        assert_eq!(first.key_collision, strategy == DuplicateStrategy::ForceNew);
    }
}
