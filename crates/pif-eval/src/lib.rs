#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod eval;
pub mod host;
mod stack;
pub mod value;

pub use context::{Context, Frame, FrameKind};
pub use error::{EvalError, EvalErrorKind, EvalResult};
pub use eval::{evaluate, EvalConfig, Evaluator, MAX_CALL_DEPTH};
pub use host::{register_builtin, root_context, Prelude, SharedWriter};
pub use value::{derive_type, Callable, Closure, Mapping, NativeFn, Params, Struct, Value};
