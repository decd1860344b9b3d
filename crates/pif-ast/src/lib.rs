#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

//! Syntax tree for PIF programs.
//!
//! The tree is produced by an external grammar engine; this crate only fixes
//! its shape. Every node carries a [`span::Span`] so evaluation errors can be
//! reported against the source.

pub mod span {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Span {
        pub start: u32,
        pub end: u32,
    }
}

pub mod ast {
    use super::span::Span;
    use serde::{Deserialize, Serialize};

    /// Assignment target that evaluates a line but drops its value.
    pub const PLACEHOLDER: &str = "_";

    /// A sequence of paragraphs sharing one context.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Block {
        pub paragraphs: Vec<Paragraph>,
        pub span: Span,
    }

    /// Lines separated from the next paragraph by a blank line. A paragraph
    /// may leave at most one anonymous value behind.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Paragraph {
        pub lines: Vec<Line>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub assignment: Option<Ident>,
        pub kind: LineKind,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum LineKind {
        Sentence(Sentence),
        If(IfStmt),
        While(WhileStmt),
        For(ForStmt),
    }

    impl LineKind {
        /// If/While/For lines, as opposed to plain sentences.
        pub fn is_statement(&self) -> bool {
            !matches!(self, LineKind::Sentence(_))
        }

        pub fn span(&self) -> Span {
            match self {
                LineKind::Sentence(s) => s.span,
                LineKind::If(s) => s.span,
                LineKind::While(s) => s.span,
                LineKind::For(s) => s.span,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Sentence {
        pub instructions: Vec<Instruction>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Instruction {
        Push(Pushable),
        /// The `.` call marker.
        Call(Span),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Pushable {
        pub kind: PushableKind,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum PushableKind {
        Name(Ident),
        Lit(Lit),
        Sequence(Vec<Sentence>),
        Mapping(Vec<MapEntry>),
        Expr(Expr),
        Function(FunctionLit),
        Type(TypeLit),
        Struct(StructLit),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Lit {
        Number(f64),
        Text(String),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MapEntry {
        pub key: Sentence,
        pub value: Sentence,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FunctionLit {
        pub params: Vec<Param>,
        pub body: Block,
        pub span: Span,
    }

    /// `name type-name` pair, used by parameter lists and type literals.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Param {
        pub name: Ident,
        pub ty: Ident,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TypeLit {
        pub fields: Vec<Param>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StructLit {
        /// Name of a structural type the struct must obey.
        pub declared: Option<Ident>,
        pub fields: Vec<FieldInit>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FieldInit {
        pub name: Ident,
        pub value: Sentence,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct IfStmt {
        pub cond: Sentence,
        pub block: Block,
        pub elifs: Vec<ElifClause>,
        pub else_block: Option<Block>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ElifClause {
        pub cond: Sentence,
        pub block: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WhileStmt {
        pub cond: Sentence,
        pub block: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ForStmt {
        pub var: Option<Ident>,
        pub sentence: Sentence,
        pub block: Block,
        pub span: Span,
    }

    /// `first (op operand)*`. Grouping the parser already resolved shows up
    /// as [`Operand::Group`].
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Expr {
        pub first: Operand,
        pub rest: Vec<(BinOp, Operand)>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Operand {
        Name(Ident),
        Number(f64, Span),
        Group(Box<Expr>),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum BinOp {
        // arithmetic
        Add,
        Sub,
        Mul,
        Div,
        // comparison
        Eq,
        Ne,
        Lt,
        Le,
        Gt,
        Ge,
    }

    impl BinOp {
        /// Binding strength; higher binds tighter.
        pub fn precedence(self) -> u8 {
            match self {
                BinOp::Mul | BinOp::Div => 3,
                BinOp::Add | BinOp::Sub => 2,
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 1,
            }
        }

        pub fn symbol(self) -> &'static str {
            match self {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Eq => "==",
                BinOp::Ne => "!=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }
}

/// Constructors for assembling trees by hand, with zero spans.
///
/// Drivers normally receive trees from the parser; these helpers exist for
/// embedding and tests.
pub mod build {
    use super::ast::*;
    use super::span::Span;

    pub fn sp() -> Span {
        Span::default()
    }

    pub fn ident(text: &str) -> Ident {
        Ident {
            text: text.to_string(),
            span: sp(),
        }
    }

    pub fn block(paragraphs: Vec<Paragraph>) -> Block {
        Block {
            paragraphs,
            span: sp(),
        }
    }

    /// A block made of a single paragraph.
    pub fn lines(lines: Vec<Line>) -> Block {
        block(vec![paragraph(lines)])
    }

    pub fn paragraph(lines: Vec<Line>) -> Paragraph {
        Paragraph { lines, span: sp() }
    }

    pub fn sentence(instructions: Vec<Instruction>) -> Sentence {
        Sentence {
            instructions,
            span: sp(),
        }
    }

    /// A line evaluating a sentence without assignment.
    pub fn say(instructions: Vec<Instruction>) -> Line {
        line(None, LineKind::Sentence(sentence(instructions)))
    }

    /// `target = <sentence>`
    pub fn assign(target: &str, instructions: Vec<Instruction>) -> Line {
        line(Some(target), LineKind::Sentence(sentence(instructions)))
    }

    pub fn line(target: Option<&str>, kind: LineKind) -> Line {
        Line {
            assignment: target.map(ident),
            kind,
            span: sp(),
        }
    }

    pub fn call() -> Instruction {
        Instruction::Call(sp())
    }

    fn push(kind: PushableKind) -> Instruction {
        Instruction::Push(Pushable { kind, span: sp() })
    }

    pub fn num(n: f64) -> Instruction {
        push(PushableKind::Lit(Lit::Number(n)))
    }

    pub fn text(s: &str) -> Instruction {
        push(PushableKind::Lit(Lit::Text(s.to_string())))
    }

    pub fn name(n: &str) -> Instruction {
        push(PushableKind::Name(ident(n)))
    }

    pub fn list(elems: Vec<Sentence>) -> Instruction {
        push(PushableKind::Sequence(elems))
    }

    pub fn dict(entries: Vec<(Sentence, Sentence)>) -> Instruction {
        push(PushableKind::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| MapEntry {
                    key,
                    value,
                    span: sp(),
                })
                .collect(),
        ))
    }

    pub fn func(params: &[(&str, &str)], body: Block) -> Instruction {
        push(PushableKind::Function(FunctionLit {
            params: fields(params),
            body,
            span: sp(),
        }))
    }

    pub fn type_lit(decl: &[(&str, &str)]) -> Instruction {
        push(PushableKind::Type(TypeLit {
            fields: fields(decl),
            span: sp(),
        }))
    }

    pub fn struct_lit(declared: Option<&str>, inits: Vec<(&str, Sentence)>) -> Instruction {
        push(PushableKind::Struct(StructLit {
            declared: declared.map(ident),
            fields: inits
                .into_iter()
                .map(|(n, value)| FieldInit {
                    name: ident(n),
                    value,
                    span: sp(),
                })
                .collect(),
            span: sp(),
        }))
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<Param> {
        pairs
            .iter()
            .map(|(n, ty)| Param {
                name: ident(n),
                ty: ident(ty),
                span: sp(),
            })
            .collect()
    }

    pub fn expr(first: Operand, rest: Vec<(BinOp, Operand)>) -> Instruction {
        push(PushableKind::Expr(expression(first, rest)))
    }

    pub fn expression(first: Operand, rest: Vec<(BinOp, Operand)>) -> Expr {
        Expr {
            first,
            rest,
            span: sp(),
        }
    }

    pub fn var(n: &str) -> Operand {
        Operand::Name(ident(n))
    }

    pub fn lit(n: f64) -> Operand {
        Operand::Number(n, sp())
    }

    pub fn group(first: Operand, rest: Vec<(BinOp, Operand)>) -> Operand {
        Operand::Group(Box::new(expression(first, rest)))
    }

    pub fn if_(cond: Sentence, then: Block, elifs: Vec<(Sentence, Block)>, else_block: Option<Block>) -> LineKind {
        LineKind::If(IfStmt {
            cond,
            block: then,
            elifs: elifs
                .into_iter()
                .map(|(cond, block)| ElifClause {
                    cond,
                    block,
                    span: sp(),
                })
                .collect(),
            else_block,
            span: sp(),
        })
    }

    pub fn while_(cond: Sentence, body: Block) -> LineKind {
        LineKind::While(WhileStmt {
            cond,
            block: body,
            span: sp(),
        })
    }

    pub fn for_(var: Option<&str>, over: Sentence, body: Block) -> LineKind {
        LineKind::For(ForStmt {
            var: var.map(ident),
            sentence: over,
            block: body,
            span: sp(),
        })
    }
}
