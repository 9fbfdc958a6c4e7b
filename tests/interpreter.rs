use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use molang::{
    DiagnosticKind, Engine, Function, MolangError, ObjectValue, ParseFailurePolicy, Value,
};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Value {
    Engine::standard()
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn number(source: &str) -> f64 {
    eval(source).as_number()
}

fn eval_error(source: &str) -> MolangError {
    match Engine::standard().eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, found {actual}"
    );
}

struct Marker(f64);

fn marker_engine() -> Engine {
    Engine::builder()
        .with_standard_library()
        .entity(Marker(1.0))
        .bind_value("other", Value::entity(Marker(7.0)))
        .bind_function(
            "query_id",
            Function::native(false, |ctx, _| {
                Value::number(ctx.entity_as::<Marker>().map_or(0.0, |marker| marker.0))
            }),
        )
        .build()
}

#[test]
fn evaluates_logic_and_comparisons() {
    assert_eq!(number("1 < 2 && 2 < 3"), 1.0);
    assert_eq!(number("false || (1 / 0 == 5)"), 0.0);
    assert_eq!(number("!0"), 1.0);
    assert_eq!(number("2 >= 2 && 3 != 4"), 1.0);
    assert_eq!(number("true + true"), 2.0);
}

#[test]
fn respects_precedence_and_division_by_zero() {
    assert_eq!(number("1 + 2 * 3 - 4 / 2"), 5.0);
    assert_eq!(number("(1 + 2) * 3"), 9.0);
    assert_eq!(number("-(2 + 3)"), -5.0);
    assert_eq!(number("5 / 0"), 0.0);
    assert_eq!(number("-5 / (2 - 2)"), 0.0);
}

#[test]
fn temp_assignments_are_visible_within_one_evaluation() {
    assert_eq!(number("temp.x = 5; temp.x"), 5.0);
    assert_eq!(number("t.x = 2; temp.X * 3"), 6.0);
}

#[test]
fn temp_is_fresh_but_variable_persists() {
    let engine = Engine::standard();
    engine.eval_source("t.x = 5; v.x = 9").unwrap();
    assert_eq!(engine.eval_number("t.x").unwrap(), 0.0);
    assert_eq!(engine.eval_number("variable.x").unwrap(), 9.0);
}

#[test]
fn scripts_cannot_create_top_level_bindings() {
    assert_eq!(number("x = 5"), 5.0);
    assert_eq!(number("x = 5; x"), 0.0);
    assert_eq!(number("math.pi = 3; math.pi"), std::f64::consts::PI);
}

#[test]
fn ternary_evaluates_only_the_taken_branch() {
    let engine = Engine::standard();
    let value = engine
        .eval_number("v.hits = 0; 1 ? (v.hits = v.hits + 1) : (v.misses = 1); v.hits")
        .unwrap();
    assert_eq!(value, 1.0);
    assert_eq!(engine.eval_number("v.misses").unwrap(), 0.0);
    assert_eq!(number("0 ? 1 : 2"), 2.0);
}

#[test]
fn binary_conditional_runs_blocks_on_the_same_frame() {
    assert_eq!(number("1 ? { t.a = 4; }; t.a"), 4.0);
    assert_eq!(number("0 ? 5"), 0.0);
    assert_eq!(number("1 ? 5"), 5.0);
}

#[test]
fn null_coalesce_falls_back_on_falsy_values() {
    assert_eq!(number("t.missing ?? 7"), 7.0);
    assert_eq!(number("3 ?? 7"), 3.0);
}

#[test]
fn loop_runs_body_the_requested_number_of_times() {
    assert_eq!(number("t.i = 0; loop(3, { t.i = t.i + 1; }); t.i"), 3.0);
    assert_eq!(number("t.i = 0; loop(2.5, { t.i = t.i + 1; }); t.i"), 3.0);
    assert_eq!(number("t.i = 0; loop(-1, { t.i = t.i + 1; }); t.i"), 0.0);
    assert_eq!(number("t.i = 0; loop(3, 5); t.i"), 0.0);
}

#[test]
fn loop_honours_break_and_continue() {
    assert_eq!(
        number("t.i = 0; loop(10, { t.i = t.i + 1; t.i >= 4 ? break; }); t.i"),
        4.0
    );
    assert_eq!(
        number(
            "t.n = 0; t.i = 0; loop(5, { t.i = t.i + 1; t.i == 3 ? continue; t.n = t.n + 1; }); t.n"
        ),
        4.0
    );
}

#[test]
fn for_each_visits_elements_in_order() {
    assert_eq!(
        number("t.sum = 0; for_each(t.e, [10, 20, 30], { t.sum = t.sum + t.e; }); t.sum"),
        60.0
    );
    assert_eq!(
        number("t.o = 0; for_each(t.e, [1, 2, 3], { t.o = t.o * 10 + t.e; }); t.o"),
        123.0
    );
    assert_eq!(
        number("t.o = 0; for_each(t.e, [1, 2, 3], { t.e == 2 ? break; t.o = t.o + t.e; }); t.o"),
        1.0
    );
    assert_eq!(number("t.o = 0; for_each(t.e, 5, { t.o = 1; }); t.o"), 0.0);
}

#[test]
fn for_each_needs_a_property_target_before_touching_the_array() {
    assert_eq!(number("for_each(5, [1], { t.o = 1; })"), 0.0);
    assert_eq!(number("for_each(5, [t.hit = 1], { t.o = 1; }); t.hit"), 0.0);
    assert_eq!(number("for_each(t, [1, 2], { t.o = 1; }); t.o"), 0.0);
}

#[test]
fn for_each_with_a_non_function_body_does_nothing() {
    assert_eq!(number("for_each(t.e, [1, 2], 5)"), 0.0);
    assert_eq!(number("t.e = 9; for_each(t.e, [1, 2], 5); t.e"), 9.0);
}

#[test]
fn return_inside_for_each_becomes_its_value() {
    assert_eq!(number("for_each(t.e, [4, 5], { return t.e * 2; })"), 8.0);
    assert_eq!(
        number("t.x = 0; for_each(t.e, [1], { return 9; }); t.x = 7; t.x"),
        7.0
    );
}

#[test]
fn access_on_a_non_object_still_runs_the_object_expression() {
    assert_eq!(number("(t.x = 3).y"), 0.0);
    assert_eq!(number("(t.x = 3).y; t.x"), 3.0);
    let engine = Engine::standard();
    assert_eq!(engine.eval_number("(v.x = 3).y").unwrap(), 0.0);
    assert_eq!(engine.eval_number("v.x").unwrap(), 3.0);
}

#[test]
fn return_stops_the_top_level_script() {
    assert_eq!(number("return 1; 2"), 1.0);
    assert_eq!(number("t.x = 1; return t.x + 1; t.x = 10"), 2.0);
}

#[test]
fn return_inside_a_loop_only_ends_that_loop() {
    assert_eq!(number("loop(3, { return 5; })"), 5.0);
    assert_eq!(number("t.x = 0; loop(3, { return 5; }); t.x = 7; t.x"), 7.0);
    assert_eq!(
        number("t.i = 0; loop(5, { t.i = t.i + 1; t.i == 2 ? return 0; }); t.i"),
        2.0
    );
}

#[test]
fn arrays_index_with_wraparound() {
    assert_eq!(number("[10, 20, 30][5]"), 30.0);
    assert_eq!(number("[10, 20, 30][1.9]"), 20.0);
    assert_eq!(number("[10, 20, 30][-4]"), 10.0);
    assert_eq!(number("[][3]"), 0.0);
    assert_eq!(number("5[0]"), 0.0);
}

#[test]
fn mismatched_types_degrade_to_zero() {
    assert_eq!(number("t.x(1)"), 0.0);
    assert_eq!(number("unknown.property.chain"), 0.0);
    assert_eq!(number("'text' * 2"), 0.0);
    assert_eq!(eval("'hello'"), Value::string("hello"));
}

#[test]
fn names_are_case_insensitive() {
    assert_eq!(number("Math.PI"), std::f64::consts::PI);
    assert_eq!(number("MATH.Sqrt(16)"), 4.0);
    assert_eq!(number("V.Count = 2; variable.COUNT"), 2.0);
}

#[test]
fn arguments_are_evaluated_only_on_demand() {
    let engine = Engine::builder()
        .with_standard_library()
        .bind_function("ignore", Function::native(true, |_, _| Value::zero()))
        .build();
    assert_eq!(engine.eval_number("ignore(v.x = 3); v.x").unwrap(), 0.0);
}

#[test]
fn arrow_switches_the_entity() {
    let engine = marker_engine();
    assert_eq!(engine.eval_number("query_id()").unwrap(), 1.0);
    assert_eq!(engine.eval_number("other -> query_id()").unwrap(), 7.0);
    assert_eq!(engine.eval_number("5 -> query_id()").unwrap(), 0.0);
}

#[test]
fn host_objects_can_be_registered() {
    let config = ObjectValue::builder().constant("gravity", 9.8).build();
    let mut engine = Engine::builder().bind_object("world", config).build();
    engine.scope_mut().set_constant("speed", 3.0);
    assert_eq!(engine.eval_number("world.gravity").unwrap(), 9.8);
    assert_eq!(engine.eval_number("speed * 2").unwrap(), 6.0);
    assert_eq!(engine.eval_number("math.pi").unwrap(), 0.0);
}

#[test]
fn math_library_matches_reference_values() {
    assert_close(number("math.sin(90)"), 1.0);
    assert_close(number("math.cos(180)"), -1.0);
    assert_close(number("math.atan2(1, 1)"), 45.0);
    assert_close(number("math.asin(1)"), 90.0);
    assert_eq!(number("math.round(2.5)"), 3.0);
    assert_eq!(number("math.round(-2.5)"), -2.0);
    assert_eq!(number("math.trunc(-2.7)"), -2.0);
    assert_eq!(number("math.clamp(5, 0, 3)"), 3.0);
    assert_eq!(number("math.mod(7, 3)"), 1.0);
    assert_eq!(number("math.lerp(0, 10, 0.25)"), 2.5);
    assert_eq!(number("math.hermite_blend(0.5)"), 0.5);
    assert_eq!(number("math.min_angle(270)"), -90.0);
    assert_eq!(number("math.pow(2, 10)"), 1024.0);
    assert_eq!(number("math.die_roll_integer(3, 1, 1)"), 3.0);
    assert_eq!(number("math.random_integer(2, 2)"), 2.0);
    let roll = number("math.random(1, 2)");
    assert!((1.0..2.0).contains(&roll));
}

#[test]
fn parse_errors_propagate_with_offsets() {
    let err = eval_error("1 + (2");
    let diagnostic = err.diagnostic().expect("parse failures are diagnostics");
    assert_eq!(diagnostic.kind, DiagnosticKind::Parser);
    assert_eq!(diagnostic.offset(), Some(6));

    let err = eval_error("1 & 2");
    assert_eq!(err.diagnostic().map(|d| d.kind.clone()), Some(DiagnosticKind::Lexer));
}

#[test]
fn zero_policy_swallows_parse_errors() {
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let engine = Engine::builder()
        .with_standard_library()
        .parse_failure(ParseFailurePolicy::Zero)
        .on_parse_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    assert_eq!(engine.eval_source("1 +").unwrap(), Value::zero());
    let prepared = engine.prepare("{ 1").unwrap();
    assert_eq!(prepared.evaluate(), Value::zero());
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(engine.eval_number("2 * 2").unwrap(), 4.0);
}

#[test]
fn prepared_scripts_re_evaluate_each_time() {
    let engine = Engine::standard();
    let prepared = engine.prepare("v.count = v.count + 1; v.count").unwrap();
    assert_eq!(prepared.evaluate(), Value::number(1.0));
    assert_eq!(prepared.evaluate(), Value::number(2.0));
    assert_eq!(prepared.statements().len(), 2);
}
