//! info関数呼び出しのテスト

mod common;

use common::{strings, StubTarget};
use kdbg_core::{CommandError, InfoQuery, QueryInvocation, TargetError};

#[test]
fn test_info_output_is_passed_through() {
    let target = StubTarget::kernel_table()
        .with_info("proc_info", "  pid  name\n    1  init\n")
        .with_info("empty_info", "");

    let query = InfoQuery::new(&target);

    let out = query
        .execute(&QueryInvocation::from_tokens(&strings(&["proc_info"])).unwrap())
        .unwrap();
    assert_eq!(out, "  pid  name\n    1  init\n");

    let out = query
        .execute(&QueryInvocation::from_tokens(&strings(&["empty_info"])).unwrap())
        .unwrap();
    assert_eq!(out, "");
}

#[test]
fn test_info_argument_is_forwarded_verbatim() {
    let target = StubTarget::kernel_table().with_info("vm_info", "map:");

    let invocation = QueryInvocation::from_tokens(&strings(&["vm_info", "curproc->p_vm"])).unwrap();
    let out = InfoQuery::new(&target).execute(&invocation).unwrap();

    assert_eq!(out, "map:curproc->p_vm");
    assert_eq!(
        *target.queries.borrow(),
        vec![("vm_info".to_string(), Some("curproc->p_vm".to_string()))]
    );
}

#[test]
fn test_info_without_argument_passes_null() {
    let target = StubTarget::kernel_table().with_info("proc_info", "x");

    let invocation = QueryInvocation::from_tokens(&strings(&["proc_info"])).unwrap();
    InfoQuery::new(&target).execute(&invocation).unwrap();

    assert_eq!(
        *target.queries.borrow(),
        vec![("proc_info".to_string(), None)]
    );
}

#[test]
fn test_info_bad_arity_never_reaches_target() {
    for tokens in [strings(&[]), strings(&["a", "b", "c"])] {
        assert!(matches!(
            QueryInvocation::from_tokens(&tokens),
            Err(CommandError::Usage(_))
        ));
    }
}

#[test]
fn test_info_unknown_function() {
    let target = StubTarget::kernel_table();

    let invocation = QueryInvocation::from_tokens(&strings(&["no_such_info"])).unwrap();
    let err = InfoQuery::new(&target).execute(&invocation).unwrap_err();

    assert!(matches!(err, TargetError::SymbolNotFound(ref s) if s == "no_such_info"));
}
