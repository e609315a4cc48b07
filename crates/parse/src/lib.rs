pub mod ast;
mod parser;
mod printer;
pub mod symbols;
pub mod types;

use anyhow::Result;

pub use ast::*;
pub use parser::{Parser, TypeAndName};
pub use symbols::{ConstantString, GlobalInit, GlobalVariable, Globals, LocalVariable, Locals, StringPool};
pub use types::{FunctionType, Member, Param, StructLayout, Type, TypeTable, WORD_SIZE};

/// State shared by every stage of one compilation.
#[derive(Debug, Default)]
pub struct Context {
    pub types: TypeTable,
    pub globals: Globals,
    /// Locals of the function being parsed; moved into its [`Function`]
    /// when the body closes.
    pub locals: Locals,
    pub strings: StringPool,
}

/// Hook run on every top-level statement of a function body as soon as it
/// is parsed, while the struct registry still reflects that point of the
/// input.
pub trait Annotate {
    fn annotate(&mut self, stmt: &mut Stmt, types: &TypeTable) -> Result<()>;
}

/// Leaves statements as parsed.
pub struct NoAnnotation;

impl Annotate for NoAnnotation {
    fn annotate(&mut self, _stmt: &mut Stmt, _types: &TypeTable) -> Result<()> {
        Ok(())
    }
}

/// Parse a whole translation unit, returning the declarations that produce
/// output together with the final context.
pub fn parse_program(src: &str, annotator: &mut dyn Annotate) -> Result<(Vec<Declaration>, Context)> {
    let mut parser = Parser::new(src)?;
    let mut decls = Vec::new();
    while let Some(decl) = parser.next_declaration(annotator)? {
        decls.push(decl);
    }
    Ok((decls, parser.into_context()))
}
