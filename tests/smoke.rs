use eforth4::{
    testutil::{drive, run_test, run_test_with, test_vm},
    token::USER_AREA,
    State, VmSignal,
};

#[test]
fn definition_and_call() {
    run_test(
        r#"
        > : sq dup * ;
        > 7 sq .
        < 49 ok
        > : quad sq sq ;
        > 3 quad .
        < 81 ok
        "#,
    );
}

#[test]
fn arithmetic_words() {
    run_test(
        r#"
        > 10 3 / . 10 3 mod .
        < 3 1 ok
        > 10 3 /mod . .
        < 3 1 ok
        > 100 7 3 */ .
        < 233 ok
        > 7 abs -7 abs + .
        < 14 ok
        > 1 4 lshift .
        < 16 ok
        > 3 5 max . 3 5 min .
        < 5 3 ok
        x 1 0 /
        "#,
    );
}

#[test]
fn comparison_flags() {
    run_test(
        r#"
        > 3 3 = . 3 4 = .
        < -1 0 ok
        > 0 0= . 1 0= .
        < -1 0 ok
        > 2 3 < . 2 3 > . 2 3 <> .
        < -1 0 -1 ok
        > -1 u.
        < 4294967295 ok
        > -1 1 u< .
        < 0 ok
        "#,
    );
}

#[test]
fn if_else_then_is_exclusive() {
    run_test(
        r#"
        > : pick-one 0= if 1 . else 2 . then ;
        > 0 pick-one
        < 1 ok
        > 5 pick-one
        < 2 ok
        "#,
    );
}

#[test]
fn begin_until_counts() {
    run_test(
        r#"
        > variable x
        > : count3 begin x @ dup . 1 + x ! x @ 3 = until ;
        > count3
        < 0 1 2 ok
        "#,
    );
}

#[test]
fn while_repeat() {
    run_test(
        r#"
        > : w 0 begin dup 3 < while dup . 1 + repeat drop ;
        > w
        < 0 1 2 ok
        "#,
    );
}

#[test]
fn for_next_counts_down() {
    run_test(
        r#"
        > : c 3 for r@ . next ;
        > c
        < 3 2 1 0 ok
        "#,
    );
}

#[test]
fn for_aft_skips_first_pass() {
    run_test(
        r#"
        > : a 3 for aft r@ . then next ;
        > a
        < 2 1 0 ok
        "#,
    );
}

#[test]
fn do_loop_counts_up() {
    run_test(
        r#"
        > : d 3 0 do i . loop ;
        > d
        < 0 1 2 ok
        "#,
    );
}

#[test]
fn variable_store_fetch() {
    run_test(
        r#"
        > variable v
        > 42 v ! v @ .
        < 42 ok
        > 8 v +! v ?
        < 50 ok
        "#,
    );
}

#[test]
fn constant_and_to() {
    run_test(
        r#"
        > 7 constant k
        > k .
        < 7 ok
        > 9 to k
        > k .
        < 9 ok
        "#,
    );
}

#[test]
fn create_comma_th() {
    run_test(
        r#"
        > create pair 10 , 20 ,
        > pair @ .
        < 10 ok
        > pair 1 th @ .
        < 20 ok
        "#,
    );
}

#[test]
fn create_does() {
    run_test(
        r#"
        > : const create , does> @ ;
        > 42 const answer
        > answer .
        < 42 ok
        "#,
    );
}

#[test]
fn redefinition_shadows() {
    run_test(
        r#"
        > : g 1 ;
        > : g 2 ;
        < g reDef?
        < ok
        > g .
        < 2 ok
        "#,
    );
}

#[test]
fn unknown_word_aborts_line() {
    run_test(
        r#"
        > nosuch 42
        < nosuch?
        < ok
        > .s
        < -> ok
        < ok
        "#,
    );
}

#[test]
fn one_short_operands_underflow() {
    // Words reaching one element deeper than the stack holds must report
    // underflow, not surface the empty-stack marker as data.
    run_test(
        r#"
        x 1 2 rot
        x 1 +
        x 1 swap
        x dup
        x 0=
        x 1 2 3 2over
        x 1 1 pick
        > 1 2 .s
        < 1 2 -> ok
        < ok
        "#,
    );
}

#[test]
fn failed_constant_leaves_no_word_behind() {
    let vm = run_test(
        r#"
        x constant k
        > k
        < k?
        < ok
        "#,
    );
    assert_eq!(vm.here(), USER_AREA);
}

#[test]
fn forget_keeps_older_definition_of_same_name() {
    run_test(
        r#"
        > : g 1 ;
        > : g 2 ;
        < g reDef?
        < ok
        > g .
        < 2 ok
        > forget g
        > g .
        < 1 ok
        "#,
    );
}

#[test]
fn stack_fault_recovers() {
    run_test(
        r#"
        x +
        > 1 2 + .
        < 3 ok
        "#,
    );
}

#[test]
fn forget_truncates() {
    let mut vm = run_test(
        r#"
        > : a1 1 ;
        > : a2 2 ;
        "#,
    );
    let before = vm.here();
    run_test_with(
        &mut vm,
        r#"
        > forget a1
        > a1
        < a1?
        < ok
        "#,
    );
    assert!(vm.here() < before);
}

#[test]
fn forget_builtin_resets_to_baseline() {
    let mut vm = run_test(
        r#"
        > : q 5 ;
        > forget dup
        > q
        < q?
        < ok
        > 1 dup + .
        < 2 ok
        "#,
    );
    assert_eq!(vm.here(), USER_AREA);
    drive(&mut vm, ": q 6 ;").unwrap();
}

#[test]
fn boot_drops_user_words() {
    let vm = run_test(
        r#"
        > : zz 9 ;
        > boot
        > zz
        < zz?
        < ok
        "#,
    );
    assert_eq!(vm.here(), USER_AREA);
}

#[test]
fn radix_prefixes_and_base() {
    run_test(
        r#"
        > $ff .
        < 255 ok
        > %101 .
        < 5 ok
        > #42 .
        < 42 ok
        > hex ff .
        < ff ok
        > 10 .
        < 10 ok
        > decimal $10 .
        < 16 ok
        "#,
    );
}

#[test]
fn string_words() {
    run_test(
        r#"
        > : hi ." hello " ;
        > hi cr
        < hello
        < ok
        > s" abc" type cr
        < abc
        < ok
        > s" abc" swap drop . cr
        < 3
        < ok
        "#,
    );
}

#[test]
fn dot_r_pads() {
    let mut vm = test_vm();
    drive(&mut vm, "42 5 .r cr").unwrap();
    assert_eq!(vm.host().out, "   42\nok\n");
}

#[test]
fn immediate_runs_at_compile_time() {
    run_test(
        r#"
        > : im 42 . ; immediate
        > : u im ;
        < 42 ok
        > u
        < ok
        "#,
    );
}

#[test]
fn exit_leaves_early() {
    run_test(
        r#"
        > : e 1 . exit 2 . ;
        > e
        < 1 ok
        "#,
    );
}

#[test]
fn tick_and_exec() {
    run_test(
        r#"
        > : sq dup * ;
        > 7 ' sq exec .
        < 49 ok
        > : apply exec ;
        > 6 ' sq apply .
        < 36 ok
        "#,
    );
}

#[test]
fn is_retargets_a_word() {
    run_test(
        r#"
        > : one 1 . ;
        > : two 2 . ;
        > ' one is two
        > one
        < 2 ok
        "#,
    );
}

#[test]
fn return_stack_words() {
    run_test(
        r#"
        > : rr 5 >r r@ . r> . ;
        > rr
        < 5 5 ok
        "#,
    );
}

#[test]
fn abort_clears_stacks() {
    run_test(
        r#"
        > 1 2 3 abort .s
        < -> ok
        < ok
        "#,
    );
}

#[test]
fn case_insensitive_search_is_opt_in() {
    run_test(
        r#"
        > : Mixed 7 . ;
        > MIXED
        < MIXED?
        < ok
        > 0 case!
        > MIXED
        < 7 ok
        > 1 case!
        "#,
    );
}

#[test]
fn see_words_dump_smoke() {
    let mut vm = test_vm();
    drive(&mut vm, ": sq dup * ;").unwrap();
    drive(&mut vm, "see sq").unwrap();
    let out = core::mem::take(&mut vm.host_mut().out);
    assert!(out.contains(": sq"), "see output: {out}");
    assert!(out.contains("dup"), "see output: {out}");
    assert!(out.contains(";"), "see output: {out}");

    drive(&mut vm, "words").unwrap();
    let out = core::mem::take(&mut vm.host_mut().out);
    assert!(out.contains("sq"), "words output: {out}");
    assert!(out.contains("does>"), "words output: {out}");

    drive(&mut vm, "0 32 dump").unwrap();
    let out = core::mem::take(&mut vm.host_mut().out);
    assert!(out.contains("0000: "), "dump output: {out}");

    drive(&mut vm, "mstat").unwrap();
    let out = core::mem::take(&mut vm.host_mut().out);
    assert!(out.contains("dict:"), "mstat output: {out}");
}

#[test]
fn scheduler_yields_are_transparent() {
    let prog = ": count 0 begin dup . 1 + dup 4 > until drop ;";

    // Reference run, clock frozen: never yields.
    let mut plain = test_vm();
    drive(&mut plain, prog).unwrap();
    assert_eq!(plain.pump("count").unwrap(), VmSignal::Done);
    let want = core::mem::take(&mut plain.host_mut().out);

    // Every clock read jumps past the slice deadline, forcing a yield at
    // each backward branch.
    let mut vm = test_vm();
    vm.host_mut().tick = 100;
    drive(&mut vm, prog).unwrap();
    let mut pumps = 1;
    let mut sig = vm.pump("count").unwrap();
    assert_eq!(sig, VmSignal::Yield);
    while sig == VmSignal::Yield {
        sig = vm.pump("ignored while resuming").unwrap();
        pumps += 1;
        assert!(pumps < 100, "scheduler failed to make progress");
    }
    assert!(pumps > 2);
    assert_eq!(vm.host_mut().out, want);
    assert_eq!(vm.host().lines_done, 2);
    assert!(vm.stack_values().is_empty());
}

#[test]
fn compiled_key_parks_and_resumes() {
    let mut vm = test_vm();
    drive(&mut vm, ": ask key emit ;").unwrap();
    vm.host_mut().out.clear();

    assert_eq!(vm.pump("ask").unwrap(), VmSignal::Yield);
    assert_eq!(vm.state(), State::Io);
    assert_eq!(vm.host().keys_requested, 1);
    // Still parked until the key arrives.
    assert_eq!(vm.pump("").unwrap(), VmSignal::Yield);

    vm.feed_key(b'A').unwrap();
    assert_eq!(vm.pump("").unwrap(), VmSignal::Done);
    assert_eq!(vm.host().out, "Aok\n");
    assert!(vm.feed_key(b'B').is_err());
}

#[test]
fn interpreted_key_preserves_line_cursor() {
    let mut vm = test_vm();
    assert_eq!(vm.pump("key emit").unwrap(), VmSignal::Yield);
    assert_eq!(vm.state(), State::Io);
    vm.feed_key(b'Z').unwrap();
    assert_eq!(vm.pump("").unwrap(), VmSignal::Done);
    assert_eq!(vm.host().out, "Zok\n");
}

#[test]
fn included_runs_scripts() {
    let mut vm = test_vm();
    vm.host_mut()
        .sources
        .insert("lib.fs".into(), ": triple 3 * ;\n5 triple .".into());
    run_test_with(
        &mut vm,
        r#"
        > s" lib.fs" included
        < ok
        < 15 ok
        < ok
        > 4 triple .
        < 12 ok
        > s" nope.fs" included
        < nope.fs load failed!
        < ok
        "#,
    );
}

#[test]
fn js_template_substitution() {
    let mut vm = test_vm();
    drive(&mut vm, r#"10 20 s" x=%d y=%d" js"#).unwrap();
    drive(&mut vm, r#"s" 100%% done" js"#).unwrap();
    drive(&mut vm, r#"255 s" c=%x" js"#).unwrap();
    assert_eq!(
        vm.host().dispatched,
        vec!["x=10 y=20", "100% done", "c=0xff"]
    );
}

#[test]
fn ms_and_rnd() {
    let mut vm = test_vm();
    vm.host_mut().now = 1234;
    run_test_with(
        &mut vm,
        r#"
        > ms .
        < 1234 ok
        > rnd 0< .
        < 0 ok
        "#,
    );
}
