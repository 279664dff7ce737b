//! モード表の列挙・切り替え・補完のテスト

mod common;

use common::{strings, StubTarget, ADD_MODE};
use kdbg_core::{Literal, ModeEntry, ModeRegistry, ModeTableLayout, TargetError};

fn layout() -> ModeTableLayout {
    ModeTableLayout::default()
}

#[test]
fn test_list_stops_at_empty_name() {
    let target = StubTarget::kernel_table();
    let layout = layout();
    let registry = ModeRegistry::new(&target, &layout);

    let names = registry.list_mode_names().unwrap();
    assert_eq!(names, strings(&["KTRACE", "PROC", "-"]));

    // 番兵の先は読まない
    let evaluations = target.evaluations.borrow();
    assert_eq!(evaluations.len(), 4);
    assert_eq!(evaluations.last().unwrap(), "dbg_tab[3].d_name");
}

#[test]
fn test_list_stops_at_null_name() {
    let target = StubTarget::with_modes(&["A", "B"]);
    target.table.borrow_mut().push(None);
    target.table.borrow_mut().push(Some("HIDDEN".to_string()));
    let layout = layout();

    let names = ModeRegistry::new(&target, &layout).list_mode_names().unwrap();
    assert_eq!(names, strings(&["A", "B"]));
}

#[test]
fn test_empty_table() {
    let target = StubTarget::with_modes(&[""]);
    let layout = layout();
    let registry = ModeRegistry::new(&target, &layout);

    assert!(registry.list_mode_names().unwrap().is_empty());
    assert!(registry.complete::<&str>(&[], "").unwrap().is_empty());
}

#[test]
fn test_unterminated_table_is_an_error() {
    let mut target = StubTarget::with_modes(&["A", "B"]);
    target.unterminated = true;
    let layout = ModeTableLayout {
        max_entries: 8,
        ..ModeTableLayout::default()
    };

    let err = ModeRegistry::new(&target, &layout)
        .list_mode_names()
        .unwrap_err();
    assert!(matches!(
        err,
        TargetError::UnterminatedTable { ref table, limit: 8 } if table == "dbg_tab"
    ));
    // 上限の次のエントリまで読んで番兵がないことを確かめる
    assert_eq!(target.evaluations.borrow().len(), 9);
}

#[test]
fn test_table_below_limit() {
    let target = StubTarget::with_modes(&["A", "B", "C", ""]);
    let layout = ModeTableLayout {
        max_entries: 4,
        ..ModeTableLayout::default()
    };

    let names = ModeRegistry::new(&target, &layout).list_mode_names().unwrap();
    assert_eq!(names, strings(&["A", "B", "C"]));
}

#[test]
fn test_table_exactly_at_limit_with_sentinel() {
    let target = StubTarget::with_modes(&["A", "B", ""]);
    let layout = ModeTableLayout {
        max_entries: 2,
        ..ModeTableLayout::default()
    };

    let names = ModeRegistry::new(&target, &layout).list_mode_names().unwrap();
    assert_eq!(names, strings(&["A", "B"]));
}

#[test]
fn test_zero_limit_still_requires_sentinel() {
    let layout = ModeTableLayout {
        max_entries: 0,
        ..ModeTableLayout::default()
    };

    let empty = StubTarget::with_modes(&[""]);
    assert!(ModeRegistry::new(&empty, &layout)
        .list_mode_names()
        .unwrap()
        .is_empty());

    // 表が読めないときに、実在するモードを存在しないと警告してはならない
    let target = StubTarget::kernel_table();
    let err = ModeRegistry::new(&target, &layout)
        .apply(&["KTRACE"])
        .unwrap_err();
    assert!(matches!(err, TargetError::UnterminatedTable { limit: 0, .. }));
    assert!(target.calls.borrow().is_empty());
}

#[test]
fn test_apply_adds_removes_and_skips_unknown() {
    let target = StubTarget::kernel_table();
    let layout = layout();

    let report = ModeRegistry::new(&target, &layout)
        .apply(&["KTRACE", "-PROC", "BOGUS"])
        .unwrap();

    assert_eq!(
        *target.calls.borrow(),
        vec![
            (ADD_MODE.to_string(), Literal::Str("KTRACE".to_string())),
            (ADD_MODE.to_string(), Literal::Str("-PROC".to_string())),
        ]
    );
    assert_eq!(
        report.warnings,
        vec!["skipping non-existent mode \"BOGUS\"".to_string()]
    );
    assert!(report.failures.is_empty());
}

#[test]
fn test_apply_reads_table_once() {
    let target = StubTarget::kernel_table();
    let layout = layout();

    ModeRegistry::new(&target, &layout)
        .apply(&["KTRACE", "PROC", "-KTRACE"])
        .unwrap();

    assert_eq!(target.evaluations.borrow().len(), 4);
    assert_eq!(target.calls.borrow().len(), 3);
}

#[test]
fn test_apply_unknown_only_never_calls_target() {
    let target = StubTarget::kernel_table();
    let layout = layout();

    let report = ModeRegistry::new(&target, &layout)
        .apply(&["NOPE", "-ALSO_NOPE"])
        .unwrap();

    assert!(target.calls.borrow().is_empty());
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[1].contains("ALSO_NOPE"));
}

#[test]
fn test_apply_duplicates_are_forwarded() {
    let target = StubTarget::kernel_table();
    let layout = layout();

    let report = ModeRegistry::new(&target, &layout)
        .apply(&["KTRACE", "KTRACE"])
        .unwrap();

    assert!(report.warnings.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(
        target.call_arguments(),
        vec![
            Literal::Str("KTRACE".to_string()),
            Literal::Str("KTRACE".to_string()),
        ]
    );
}

#[test]
fn test_apply_failure_does_not_stop_later_tokens() {
    let mut target = StubTarget::kernel_table();
    target.failing_arguments = strings(&["KTRACE"]);
    let layout = layout();

    let report = ModeRegistry::new(&target, &layout)
        .apply(&["KTRACE", "PROC"])
        .unwrap();

    assert_eq!(target.calls.borrow().len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "KTRACE");
    assert!(matches!(report.failures[0].1, TargetError::CallFailed { .. }));
}

#[test]
fn test_complete_by_prefix() {
    let target = StubTarget::kernel_table();
    let layout = layout();
    let registry = ModeRegistry::new(&target, &layout);

    assert_eq!(
        registry.complete::<&str>(&[], "K").unwrap(),
        strings(&["KTRACE"])
    );
    assert_eq!(
        registry.complete::<&str>(&[], "").unwrap(),
        strings(&["-", "KTRACE", "PROC"])
    );
    assert!(registry.complete::<&str>(&[], "Z").unwrap().is_empty());
}

#[test]
fn test_complete_excludes_already_typed() {
    let target = StubTarget::kernel_table();
    let layout = layout();
    let registry = ModeRegistry::new(&target, &layout);

    assert_eq!(
        registry.complete(&["KTRACE"], "").unwrap(),
        strings(&["-", "PROC"])
    );
    // 削除指定で書かれていても除外する
    assert_eq!(
        registry.complete(&["-PROC"], "").unwrap(),
        strings(&["-", "KTRACE"])
    );
}

#[test]
fn test_complete_reflects_live_table() {
    let target = StubTarget::kernel_table();
    let layout = layout();
    let registry = ModeRegistry::new(&target, &layout);

    assert_eq!(registry.complete::<&str>(&[], "S").unwrap(), Vec::<String>::new());

    // ターゲット側で表が書き換わった
    target.table.borrow_mut()[2] = Some("SCHED".to_string());

    assert_eq!(
        registry.complete::<&str>(&[], "S").unwrap(),
        strings(&["SCHED"])
    );
}

#[test]
fn test_entries_mark_active_modes() {
    let target = StubTarget::kernel_table();
    // KTRACE = 0b001, PROC = 0b010, "-" = 0b100
    target.active_mask.set(0b101);
    let layout = layout();

    let entries = ModeRegistry::new(&target, &layout).entries().unwrap();
    assert_eq!(
        entries,
        vec![
            ModeEntry { name: "KTRACE".to_string(), active: true },
            ModeEntry { name: "PROC".to_string(), active: false },
            ModeEntry { name: "-".to_string(), active: true },
        ]
    );
}

#[test]
fn test_entries_with_empty_bit_set_are_inactive() {
    let target = StubTarget::with_modes(&["ALL", "NONE", ""]);
    *target.mode_bits.borrow_mut() = vec![0b11, 0, 0];
    target.active_mask.set(u64::MAX);
    let layout = layout();

    let entries = ModeRegistry::new(&target, &layout).entries().unwrap();
    assert!(entries[0].active);
    assert!(!entries[1].active);
}

#[test]
fn test_evaluation_error_propagates() {
    let target = StubTarget::kernel_table();
    let layout = ModeTableLayout {
        table: "missing_tab".to_string(),
        ..ModeTableLayout::default()
    };

    let err = ModeRegistry::new(&target, &layout)
        .list_mode_names()
        .unwrap_err();
    assert!(matches!(err, TargetError::SymbolNotFound(ref s) if s == "missing_tab"));
}
