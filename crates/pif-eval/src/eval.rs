//! Evaluator for PIF programs
//!
//! Walks the syntax tree directly. All variable resolution goes through
//! [`Context`]: sentences open a transient frame, closures open a function
//! frame over their captured snapshot, and if/while/for bodies run in the
//! frame of the line that contains them.

use std::collections::BTreeMap;
use std::iter;

use pif_ast::ast::{
    BinOp, Block, Expr, ForStmt, FunctionLit, IfStmt, Instruction, Line, LineKind, Lit, Operand,
    Param, Pushable, PushableKind, Sentence, StructLit, TypeLit, WhileStmt, PLACEHOLDER,
};
use pif_types::{StructuralType, Type};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{Context, Frame};
use crate::error::{EvalError, EvalErrorKind, EvalResult, ResultExt};
use crate::stack::ensure_sufficient_stack;
use crate::value::{Callable, Closure, Mapping, Struct, Value};

/// Default limit on nested PIF invocations before `CallDepthExceeded`.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Evaluator settings. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// Evaluate a whole program against `root` with default settings.
///
/// Returns the program's leftover anonymous value, if any; deciding what a
/// leftover means is up to the caller.
pub fn evaluate(program: &Block, root: &mut Context) -> EvalResult<Option<Value>> {
    Evaluator::new().evaluate(program, root)
}

#[derive(Debug, Default)]
pub struct Evaluator {
    config: EvalConfig,
    /// Current number of nested invocations.
    depth: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Self { config, depth: 0 }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn evaluate(&mut self, program: &Block, root: &mut Context) -> EvalResult<Option<Value>> {
        self.eval_block(root, program)
    }

    /// Evaluate every paragraph in `c`. Each paragraph may leave at most one
    /// anonymous value behind; the block's result is whatever is left.
    pub fn eval_block(&mut self, c: &mut Context, block: &Block) -> EvalResult<Option<Value>> {
        ensure_sufficient_stack(|| -> EvalResult<Option<Value>> {
            for paragraph in &block.paragraphs {
                for line in &paragraph.lines {
                    self.eval_line(c, line).at(line.kind.span())?;
                }
                c.result().at(paragraph.span)?;
            }
            c.result().at(block.span)
        })
    }

    fn eval_line(&mut self, c: &mut Context, line: &Line) -> EvalResult<()> {
        let res = match &line.kind {
            LineKind::Sentence(s) => self.eval_sentence(c, s)?,
            LineKind::If(s) => self.eval_if(c, s)?,
            LineKind::While(s) => self.eval_while(c, s)?,
            LineKind::For(s) => self.eval_for(c, s)?,
        };
        let target = line.assignment.as_ref().map(|id| id.text.as_str());

        let Some(v) = res else {
            if target.is_some() {
                return Err(EvalErrorKind::MissingValue("assigned line").into());
            }
            return Ok(());
        };

        let Some(target) = target else {
            // Statements already left their value in `c`; only sentences
            // push by default.
            if !line.kind.is_statement() {
                c.push_type(v)?;
            }
            return Ok(());
        };

        if line.kind.is_statement() {
            c.discard_local(&v.type_of());
        }
        if target != PLACEHOLDER {
            let v = match v {
                Value::Closure(f) => Value::Closure(f.bound_to(target)),
                v => v,
            };
            c.push_name(target, v)?;
        }
        Ok(())
    }

    /// Evaluate a sentence in a fresh frame under `c`.
    ///
    /// Pushables are evaluated against `c` and their values collected in
    /// the sentence frame. A `.` invokes the closure written right before
    /// it, or else the `Function` popped from the sentence frame, using the
    /// sentence frame as argument source.
    pub fn eval_sentence(&mut self, c: &mut Context, s: &Sentence) -> EvalResult<Option<Value>> {
        let mut frame = Frame::sentence();
        let mut pending: Option<Closure> = None;

        for (i, instruction) in s.instructions.iter().enumerate() {
            match instruction {
                Instruction::Push(p) => {
                    let v = self.eval_pushable(c, p).at(p.span)?;
                    let calls_next = matches!(s.instructions.get(i + 1), Some(Instruction::Call(_)));
                    match v {
                        Value::Closure(f) if calls_next => pending = Some(f),
                        v => frame.push_type(v).at(p.span)?,
                    }
                }
                Instruction::Call(span) => {
                    let tight = pending.take();
                    let (back, out) = c.with_frame(frame, |c| -> EvalResult<Option<Value>> {
                        let callee = match tight {
                            Some(f) => f,
                            None => match c.pop_type(&Type::function())? {
                                Value::Closure(f) => f,
                                other => {
                                    return Err(EvalError::type_mismatch(format!(
                                        "cannot call {other}"
                                    )))
                                }
                            },
                        };
                        self.invoke(c, &callee)
                    });
                    frame = back;
                    if let Some(v) = out.at(*span)? {
                        frame.push_type(v).at(*span)?;
                    }
                }
            }
        }

        frame.result().at(s.span)
    }

    fn eval_pushable(&mut self, c: &mut Context, p: &Pushable) -> EvalResult<Value> {
        match &p.kind {
            PushableKind::Name(id) => c.get_name(&id.text).at(id.span),
            PushableKind::Lit(Lit::Number(n)) => Ok(Value::Number(*n)),
            PushableKind::Lit(Lit::Text(s)) => Ok(Value::Text(s.clone())),
            PushableKind::Sequence(elems) => elems
                .iter()
                .map(|s| self.eval_element(c, s))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Sequence),
            PushableKind::Mapping(entries) => {
                let mut m = Mapping::new();
                for entry in entries {
                    let k = self.eval_element(c, &entry.key)?;
                    let v = self.eval_element(c, &entry.value)?;
                    m.insert(k, v);
                }
                Ok(Value::Mapping(m))
            }
            PushableKind::Expr(e) => self.eval_expr(c, e).map(Value::Number),
            PushableKind::Function(f) => self.eval_function(c, f),
            PushableKind::Type(t) => eval_type_lit(c, t),
            PushableKind::Struct(s) => self.eval_struct_lit(c, s),
        }
    }

    /// A literal element must produce a value.
    fn eval_element(&mut self, c: &mut Context, s: &Sentence) -> EvalResult<Value> {
        self.eval_sentence(c, s)
            .at(s.span)?
            .ok_or_else(|| EvalError::new(EvalErrorKind::MissingValue("literal element")).at(s.span))
    }

    /// Parameter types are resolved once, against the defining context;
    /// the closure then freezes a copy of that context.
    fn eval_function(&mut self, c: &mut Context, f: &FunctionLit) -> EvalResult<Value> {
        let params = f
            .params
            .iter()
            .map(|p| Ok((p.name.text.clone(), resolve_type(c, p)?)))
            .collect::<EvalResult<Vec<_>>>()?;
        let closure = Closure::user(c.snapshot_for_closure(), params, f.body.clone());
        Ok(Value::Closure(closure))
    }

    fn eval_struct_lit(&mut self, c: &mut Context, s: &StructLit) -> EvalResult<Value> {
        let declared = match &s.declared {
            Some(id) => match c.get_name(&id.text).at(id.span)? {
                Value::TypeTag(Type::Struct(st)) => Some(st),
                other => {
                    return Err(EvalError::type_mismatch(format!(
                        "`{}` is {other}, not a structural type",
                        id.text
                    ))
                    .at(id.span))
                }
            },
            None => None,
        };
        let mut fields = BTreeMap::new();
        for init in &s.fields {
            let v = self.eval_sentence(c, &init.value).at(init.span)?.ok_or_else(|| {
                EvalError::new(EvalErrorKind::MissingValue("struct field")).at(init.span)
            })?;
            fields.insert(init.name.text.clone(), v);
        }
        Struct::construct(fields, declared.as_ref())
            .map(Value::Struct)
            .at(s.span)
    }

    /// Call `callee`, drawing its arguments from the current frame of
    /// `caller`.
    pub fn invoke(&mut self, caller: &mut Context, callee: &Closure) -> EvalResult<Option<Value>> {
        if self.depth >= self.config.max_call_depth {
            return Err(EvalErrorKind::CallDepthExceeded {
                limit: self.config.max_call_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.invoke_inner(caller, callee));
        self.depth -= 1;
        result
    }

    fn invoke_inner(&mut self, caller: &mut Context, callee: &Closure) -> EvalResult<Option<Value>> {
        debug!(callee = %callee, depth = self.depth, "invoke");
        match callee.callable() {
            Callable::User { captured, body } => {
                let mut defining = captured.clone();
                if let Some(name) = callee.name() {
                    defining.bind_self(name, Value::Closure(callee.clone()));
                }
                let mut call_ctx = defining.bind_call(caller, callee.params())?;
                if body.paragraphs.is_empty() {
                    return Ok(None);
                }
                self.eval_block(&mut call_ctx, body)
            }
            Callable::Native(f) => {
                // Natives are not defined anywhere, so they bind against an
                // empty context.
                let call_ctx = Context::root().bind_call(caller, callee.params())?;
                let args = callee
                    .params()
                    .iter()
                    .map(|(name, _)| {
                        call_ctx.current().name(name).cloned().ok_or_else(|| {
                            EvalError::from(EvalErrorKind::NameNotFound { name: name.clone() })
                        })
                    })
                    .collect::<EvalResult<Vec<_>>>()?;
                f(&args)
            }
        }
    }

    fn eval_if(&mut self, c: &mut Context, s: &IfStmt) -> EvalResult<Option<Value>> {
        let branches = iter::once((&s.cond, &s.block))
            .chain(s.elifs.iter().map(|clause| (&clause.cond, &clause.block)));
        for (cond, block) in branches {
            if self.eval_condition(c, cond, "if")?.is_truthy() {
                return self.eval_block(c, block);
            }
        }
        match &s.else_block {
            Some(block) => self.eval_block(c, block),
            None => Ok(None),
        }
    }

    fn eval_while(&mut self, c: &mut Context, s: &WhileStmt) -> EvalResult<Option<Value>> {
        let mut last = None;
        while self.eval_condition(c, &s.cond, "while")?.is_truthy() {
            last = self.eval_block(c, &s.block)?;
        }
        Ok(last)
    }

    fn eval_condition(
        &mut self,
        c: &mut Context,
        cond: &Sentence,
        construct: &'static str,
    ) -> EvalResult<Value> {
        self.eval_sentence(c, cond).at(cond.span)?.ok_or_else(|| {
            EvalError::new(EvalErrorKind::MissingConditionResult { construct }).at(cond.span)
        })
    }

    fn eval_for(&mut self, c: &mut Context, s: &ForStmt) -> EvalResult<Option<Value>> {
        let over = self
            .eval_sentence(c, &s.sentence)
            .at(s.sentence.span)?
            .ok_or_else(|| EvalError::new(EvalErrorKind::MissingValue("for")).at(s.sentence.span))?;
        let items: Vec<Value> = match over {
            Value::Sequence(items) => items,
            Value::Mapping(m) => m.keys().cloned().collect(),
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "cannot iterate over {}",
                    other.type_of()
                ))
                .at(s.sentence.span))
            }
        };

        let mut last = None;
        for item in items {
            match s.var.as_ref().map(|id| id.text.as_str()) {
                None => c.push_type(item)?,
                Some(PLACEHOLDER) => {}
                Some(name) => c.push_name(name, item)?,
            }
            last = self.eval_block(c, &s.block)?;
        }
        Ok(last)
    }

    /// Operands are evaluated left to right, then folded with `* /` binding
    /// tighter than `+ -`, and both tighter than comparisons.
    fn eval_expr(&mut self, c: &mut Context, e: &Expr) -> EvalResult<f64> {
        let first = self.eval_operand(c, &e.first)?;
        let mut rest = Vec::with_capacity(e.rest.len());
        for (op, operand) in &e.rest {
            rest.push((*op, self.eval_operand(c, operand)?));
        }
        fold(first, rest).at(e.span)
    }

    /// A name holding a number is used directly; a name holding a type tag
    /// stands for the pending anonymous value of that type.
    fn eval_operand(&mut self, c: &mut Context, operand: &Operand) -> EvalResult<f64> {
        match operand {
            Operand::Number(n, _) => Ok(*n),
            Operand::Group(e) => self.eval_expr(c, e),
            Operand::Name(id) => {
                let v = match c.get_name(&id.text).at(id.span)? {
                    Value::TypeTag(ty) => c.pop_type(&ty).at(id.span)?,
                    v => v,
                };
                v.as_number().ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "`{}` is {}, expected number",
                        id.text,
                        v.type_of()
                    ))
                    .at(id.span)
                })
            }
        }
    }
}

fn eval_type_lit(c: &mut Context, t: &TypeLit) -> EvalResult<Value> {
    let shape = t
        .fields
        .iter()
        .map(|field| Ok((field.name.text.clone(), resolve_type(c, field)?)))
        .collect::<EvalResult<StructuralType>>()?;
    Ok(Value::TypeTag(Type::Struct(shape)))
}

/// Type names are ordinary names bound to type tags.
fn resolve_type(c: &mut Context, p: &Param) -> EvalResult<Type> {
    match c.get_name(&p.ty.text).at(p.ty.span)? {
        Value::TypeTag(ty) => Ok(ty),
        other => Err(EvalError::type_mismatch(format!(
            "`{}` is {other}, not a type",
            p.ty.text
        ))
        .at(p.ty.span)),
    }
}

fn fold(first: f64, rest: Vec<(BinOp, f64)>) -> EvalResult<f64> {
    let (mut acc, mut rest) = (first, rest);
    for level in [3, 2, 1] {
        (acc, rest) = collapse(acc, rest, level)?;
    }
    Ok(acc)
}

/// Apply every operator of precedence `level`, left to right.
fn collapse(first: f64, rest: Vec<(BinOp, f64)>, level: u8) -> EvalResult<(f64, Vec<(BinOp, f64)>)> {
    let mut acc = first;
    let mut out: Vec<(BinOp, f64)> = Vec::with_capacity(rest.len());
    for (op, rhs) in rest {
        if op.precedence() != level {
            out.push((op, rhs));
            continue;
        }
        match out.last_mut() {
            Some((_, lhs)) => *lhs = apply(op, *lhs, rhs)?,
            None => acc = apply(op, acc, rhs)?,
        }
    }
    Ok((acc, out))
}

fn apply(op: BinOp, l: f64, r: f64) -> EvalResult<f64> {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    Ok(match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div if r == 0.0 => return Err(EvalErrorKind::DivisionByZero.into()),
        BinOp::Div => l / r,
        BinOp::Eq => truth(l == r),
        BinOp::Ne => truth(l != r),
        BinOp::Lt => truth(l < r),
        BinOp::Le => truth(l <= r),
        BinOp::Gt => truth(l > r),
        BinOp::Ge => truth(l >= r),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pif_ast::build::*;

    fn run(block: &Block) -> EvalResult<Option<Value>> {
        evaluate(block, &mut Context::root())
    }

    #[test]
    fn fold_respects_precedence() {
        // 5 + 2 * 3
        let v = fold(5.0, vec![(BinOp::Add, 2.0), (BinOp::Mul, 3.0)]).unwrap();
        assert_eq!(v, 11.0);
        // 10 - 4 - 3 is left associative
        let v = fold(10.0, vec![(BinOp::Sub, 4.0), (BinOp::Sub, 3.0)]).unwrap();
        assert_eq!(v, 3.0);
        // 1 + 1 == 2 * 1
        let v = fold(1.0, vec![(BinOp::Add, 1.0), (BinOp::Eq, 2.0), (BinOp::Mul, 1.0)]).unwrap();
        assert_eq!(v, 1.0);
    }

    #[test]
    fn division_by_zero() {
        let err = fold(1.0, vec![(BinOp::Div, 0.0)]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn eval_literal_sentence() {
        let program = lines(vec![say(vec![num(42.0)])]);
        assert_eq!(run(&program).unwrap(), Some(Value::Number(42.0)));
    }

    #[test]
    fn empty_program_has_no_result() {
        assert_eq!(run(&block(vec![])).unwrap(), None);
    }

    #[test]
    fn placeholder_assignment_drops_value() {
        let program = lines(vec![line(
            Some(PLACEHOLDER),
            LineKind::Sentence(sentence(vec![num(1.0)])),
        )]);
        assert_eq!(run(&program).unwrap(), None);
    }

    #[test]
    fn assigning_nothing_is_an_error() {
        // x = if 0 do 3 end
        let program = lines(vec![line(
            Some("x"),
            if_(sentence(vec![num(0.0)]), lines(vec![say(vec![num(3.0)])]), vec![], None),
        )]);
        let err = run(&program).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::MissingValue("assigned line"));
    }

    #[test]
    fn statement_assignment_takes_value_out_of_the_frame() {
        // x = if 1 do 3 end
        // x
        let program = lines(vec![
            line(
                Some("x"),
                if_(sentence(vec![num(1.0)]), lines(vec![say(vec![num(3.0)])]), vec![], None),
            ),
            say(vec![name("x")]),
        ]);
        assert_eq!(run(&program).unwrap(), Some(Value::Number(3.0)));
    }

    #[test]
    fn call_depth_is_limited() {
        // f = func () f. end
        // f.
        let program = lines(vec![
            assign("f", vec![func(&[], lines(vec![say(vec![name("f"), call()])]))]),
            say(vec![name("f"), call()]),
        ]);
        let mut evaluator = Evaluator::with_config(EvalConfig { max_call_depth: 8 });
        let err = evaluator
            .evaluate(&program, &mut Context::root())
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::CallDepthExceeded { limit: 8 });
    }
}
