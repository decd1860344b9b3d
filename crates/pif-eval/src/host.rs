//! Native callables and the built-in prelude.
//!
//! Natives are ordinary closures as far as a program can tell: they are
//! bound by name, called with `.`, and fill their parameters from the
//! caller's sentence like any user function.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use pif_types::Type;
use tracing::debug;

use crate::context::Context;
use crate::error::{EvalErrorKind, EvalResult};
use crate::value::{Closure, Params, Value};

/// Output sink shared by the printing built-ins.
pub type SharedWriter = Rc<RefCell<dyn Write>>;

/// Bind a native callable under `name` in the current frame of `ctx`.
///
/// `f` receives the argument values in the order of `params`.
pub fn register_builtin<F>(ctx: &mut Context, name: &str, params: Params, f: F) -> EvalResult<()>
where
    F: Fn(&[Value]) -> EvalResult<Option<Value>> + 'static,
{
    debug!(%name, "register builtin");
    ctx.push_name(name, Value::Closure(Closure::native(name, params, Rc::new(f))))
}

/// A root context with the prelude installed, printing to stdout.
pub fn root_context() -> EvalResult<Context> {
    let mut ctx = Context::root();
    Prelude::new().install(&mut ctx)?;
    Ok(ctx)
}

/// Standard names every program starts with.
pub struct Prelude {
    out: SharedWriter,
}

impl Default for Prelude {
    fn default() -> Self {
        Self::with_writer(Rc::new(RefCell::new(io::stdout())))
    }
}

impl Prelude {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(out: SharedWriter) -> Self {
        Self { out }
    }

    pub fn install(&self, ctx: &mut Context) -> EvalResult<()> {
        let tags = [
            ("number", Type::number()),
            ("string", Type::text()),
            ("list", Type::sequence()),
            ("dict", Type::mapping()),
            ("Function", Type::function()),
            ("Type", Type::type_()),
        ];
        for (name, ty) in tags {
            ctx.push_name(name, Value::TypeTag(ty))?;
        }

        // Consumers: take one anonymous value and drop it.
        register_builtin(ctx, "eat_s", single("s", Type::text()), |_| Ok(None))?;
        register_builtin(ctx, "eat_f", single("f", Type::number()), |_| Ok(None))?;

        self.printer(ctx, "print_s", "s", Type::text())?;
        self.printer(ctx, "print_f", "f", Type::number())?;
        self.printer(ctx, "print_l", "l", Type::sequence())?;
        self.printer(ctx, "print_d", "d", Type::mapping())
    }

    fn printer(&self, ctx: &mut Context, name: &'static str, param: &str, ty: Type) -> EvalResult<()> {
        let out = Rc::clone(&self.out);
        register_builtin(ctx, name, single(param, ty), move |args| {
            let mut out = out.borrow_mut();
            for arg in args {
                let written = match arg {
                    Value::Text(s) => writeln!(out, "{s}"),
                    v => writeln!(out, "{v}"),
                };
                written.map_err(|e| EvalErrorKind::Host {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            }
            Ok(None)
        })
    }
}

fn single(name: &str, ty: Type) -> Params {
    vec![(name.to_string(), ty)]
}
