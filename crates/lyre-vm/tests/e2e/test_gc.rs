use super::helpers::*;
use lyre_vm::Runtime;

#[test]
fn test_locals_are_reclaimed_by_refcounting() {
    let mut rt = Runtime::new();
    let before = rt.heap.destroyed_count();
    rt.do_string("local s = \"temporary\"\nlocal xs = [1, 2, 3]\n")
        .unwrap();
    assert!(rt.heap.destroyed_count() > before);
}

#[test]
fn test_global_reassignment_frees_old_value() {
    let mut rt = Runtime::new();
    rt.do_string("x = [1, 2, 3]\n").unwrap();
    let before = rt.heap.destroyed_count();
    rt.do_string("x = null\n").unwrap();
    assert!(rt.heap.destroyed_count() > before);
}

#[test]
fn test_self_cycle_needs_a_collection() {
    let mut rt = Runtime::new();
    rt.do_string("x = [null]\nx[1] = x\nx = null\n").unwrap();
    // refcounting alone cannot free the cycle
    let freed = rt.collect();
    assert!(freed >= 1, "collect freed {freed} objects");
}

#[test]
fn test_two_object_cycle_is_reclaimed() {
    let mut rt = Runtime::new();
    // the inner table is built while `a` is on the stack, so both tables
    // genuinely share: a -> {"back": a} -> a
    rt.do_string("a = {\"other\": null}\na[\"other\"] = {\"back\": a}\na = null\n")
        .unwrap();
    let freed = rt.collect();
    assert!(freed >= 2, "collect freed {freed} objects");
}

#[test]
fn test_assignment_between_globals_copies_instead_of_sharing() {
    let mut rt = Runtime::new();
    // value semantics: a["other"] = b snapshots b, so no cycle can form
    // across two globals and plain refcounting frees everything
    rt.do_string(
        "a = {\"other\": null}\nb = {\"other\": null}\na[\"other\"] = b\nb[\"other\"] = a\nassert b[\"other\"][\"other\"][\"other\"] == null\na = null\nb = null\n",
    )
    .unwrap();
    let baseline = rt.heap.live_count();
    let freed = rt.collect();
    assert_eq!(freed, 0, "refcounting already freed the snapshots");
    assert_eq!(rt.heap.live_count(), baseline);
}

#[test]
fn test_failed_container_literal_releases_its_items() {
    let mut rt = Runtime::new();
    let baseline = rt.heap.live_count();
    // the second key is unhashable, so the literal aborts with the first
    // pair already consumed and the rest still pending
    let e = rt
        .do_string("t = {\"a\": [1], [2]: [3], \"b\": [4]}\n")
        .unwrap_err();
    assert!(e.to_string().contains("is not hashable"), "{e}");
    assert_eq!(rt.heap.live_count(), baseline);

    let e = rt.do_string("s = {\"x\", [1], \"y\"}\n").unwrap_err();
    assert!(e.to_string().contains("is not hashable"), "{e}");
    assert_eq!(rt.heap.live_count(), baseline);
}

#[test]
fn test_negation_type_error_releases_the_operand() {
    let mut rt = Runtime::new();
    let baseline = rt.heap.live_count();
    let e = rt.do_string("x = -\"oops\"\n").unwrap_err();
    assert!(e.to_string().contains("Cannot negate"), "{e}");
    assert_eq!(rt.heap.live_count(), baseline);
}

#[test]
fn test_collect_spares_live_objects() {
    let mut rt = Runtime::new();
    rt.do_string("keep = [1, 2, 3]\n").unwrap();
    rt.collect();
    rt.do_string("assert keep[2] == 2\n").unwrap();
}

#[test]
fn test_collect_spares_closure_captures() {
    let mut rt = Runtime::new();
    rt.capture_output(true);
    rt.do_string(
        r#"
function make()
    local state = [0]
    function bump()
        state[1] += 1
        return state[1]
    end
    return bump
end
c = make()
c()
"#,
    )
    .unwrap();
    rt.collect();
    rt.do_string("assert c() == 2\n").unwrap();
}

#[test]
fn test_repeated_runs_do_not_leak() {
    let mut rt = Runtime::new();
    rt.do_string("local warm = [1]\n").unwrap();
    let baseline = rt.heap.live_count();
    for _ in 0..50 {
        rt.do_string("local xs = [1, [2, [3]]]\nlocal t = {\"k\": xs}\n")
            .unwrap();
    }
    rt.collect();
    assert_eq!(rt.heap.live_count(), baseline);
}

#[test]
fn test_foreach_does_not_leak_iterators() {
    let mut rt = run("foreach v in [1, 2, 3] do\npass\nend\n");
    rt.collect();
    // iterator and list are gone; only interned class globals remain
    let live = rt.heap.live_count();
    let mut fresh = Runtime::new();
    assert_eq!(live, fresh.heap.live_count());
    fresh.collect();
}
