//! Trees and settings arriving as JSON from an outside front end.

use std::cell::RefCell;
use std::rc::Rc;

use pif_ast::ast::{BinOp, Block};
use pif_ast::build::*;
use pif_eval::{Context, EvalConfig, EvalErrorKind, Evaluator, Prelude, Value, MAX_CALL_DEPTH};
use pif_types::{StructuralType, Type};
use pretty_assertions::assert_eq;

fn countdown() -> Block {
    // n = 3
    // while ((n > 0)) do
    //   n = ((n - 1))
    //   n print_f .
    // end
    lines(vec![
        assign("n", vec![num(3.0)]),
        line(
            None,
            while_(
                sentence(vec![expr(var("n"), vec![(BinOp::Gt, lit(0.0))])]),
                lines(vec![
                    assign("n", vec![expr(var("n"), vec![(BinOp::Sub, lit(1.0))])]),
                    say(vec![name("n"), name("print_f"), call()]),
                ]),
            ),
        ),
    ])
}

fn run_captured(program: &Block, config: EvalConfig) -> (Result<Option<Value>, EvalErrorKind>, String) {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::root();
    Prelude::with_writer(buf.clone())
        .install(&mut ctx)
        .expect("prelude failed");
    let result = Evaluator::with_config(config)
        .evaluate(program, &mut ctx)
        .map_err(|e| e.kind);
    let out = String::from_utf8(buf.borrow().clone()).expect("utf8 output");
    (result, out)
}

#[test]
fn json_tree_evaluates_like_the_built_one() {
    let built = countdown();
    let json = serde_json::to_string(&built).expect("serialize tree");
    let parsed: Block = serde_json::from_str(&json).expect("deserialize tree");

    let (expected, expected_out) = run_captured(&built, EvalConfig::default());
    let (got, got_out) = run_captured(&parsed, EvalConfig::default());

    assert_eq!(expected, Ok(None));
    assert_eq!(got, expected);
    assert_eq!(got_out, "2\n1\n0\n");
    assert_eq!(got_out, expected_out);
}

#[test]
fn config_fields_default_when_absent() {
    let config: EvalConfig = serde_json::from_str("{}").expect("parse config");
    assert_eq!(config.max_call_depth, MAX_CALL_DEPTH);

    let config: EvalConfig =
        serde_json::from_str(r#"{"max_call_depth": 16}"#).expect("parse config");
    assert_eq!(config, EvalConfig { max_call_depth: 16 });
}

#[test]
fn configured_depth_limit_stops_runaway_recursion() {
    // down = func (n number) down ((n + 1)) . end
    // down 0 .
    let program = lines(vec![
        assign(
            "down",
            vec![func(
                &[("n", "number")],
                lines(vec![say(vec![
                    name("down"),
                    expr(var("n"), vec![(BinOp::Add, lit(1.0))]),
                    call(),
                ])]),
            )],
        ),
        say(vec![name("down"), num(0.0), call()]),
    ]);
    let config: EvalConfig =
        serde_json::from_str(r#"{"max_call_depth": 32}"#).expect("parse config");
    let (result, _) = run_captured(&program, config);
    assert_eq!(result, Err(EvalErrorKind::CallDepthExceeded { limit: 32 }));
}

#[test]
fn types_survive_json() {
    let inner: StructuralType = [("x".to_string(), Type::number())].into_iter().collect();
    let shape: StructuralType = [
        ("at".to_string(), Type::Struct(inner)),
        ("label".to_string(), Type::text()),
        ("next".to_string(), Type::function()),
    ]
    .into_iter()
    .collect();
    let ty = Type::Struct(shape);

    let json = serde_json::to_string(&ty).expect("serialize type");
    let back: Type = serde_json::from_str(&json).expect("deserialize type");
    assert_eq!(back, ty);
    assert_eq!(back.to_string(), ty.to_string());
}
