//! C-syntax rendering of the tree. Every binary operator and assignment is
//! parenthesized, so the output parses back to the same structure.

use std::fmt;

use crate::ast::*;
use crate::symbols::GlobalInit;
use crate::types::{c_declarator, Type};

const INDENT: &str = "    ";

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Num(v) => write!(f, "{}", v),
            ExprKind::Str { text, .. } => f.write_str(text),
            ExprKind::Local { name, .. } | ExprKind::Global { name } | ExprKind::Unresolved(name) => {
                f.write_str(name)
            }
            ExprKind::Unary { op, operand } => {
                // `- -x` and `& &x` would re-lex as `--` and `&&`
                if matches!(operand.kind, ExprKind::Unary { .. }) {
                    write!(f, "{}({})", op.symbol(), operand)
                } else {
                    write!(f, "{}{}", op.symbol(), operand)
                }
            }
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            ExprKind::Assign { lhs, rhs } => write!(f, "({} = {})", lhs, rhs),
            ExprKind::Member { base, field, arrow } => {
                let sep = if *arrow { "->" } else { "." };
                if matches!(base.kind, ExprKind::Unary { .. }) {
                    write!(f, "({}){}{}", base, sep, field.name())
                } else {
                    write!(f, "{}{}{}", base, sep, field.name())
                }
            }
            ExprKind::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_opt(f: &mut fmt::Formatter<'_>, e: &Option<Expr>) -> fmt::Result {
    match e {
        Some(e) => write!(f, "{}", e),
        None => Ok(()),
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], level: usize) -> fmt::Result {
    writeln!(f, "{{")?;
    for s in stmts {
        f.write_str(&INDENT.repeat(level + 1))?;
        write_stmt(f, s, level + 1)?;
        writeln!(f)?;
    }
    write!(f, "{}}}", INDENT.repeat(level))
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, level: usize) -> fmt::Result {
    match stmt {
        Stmt::VarDecl { name, ty, init, .. } => {
            f.write_str(&c_declarator(ty, name))?;
            if let Some(e) = init {
                write!(f, " = {}", e)?;
            }
            f.write_str(";")
        }
        Stmt::Return(None) => f.write_str("return;"),
        Stmt::Return(Some(e)) => write!(f, "return {};", e),
        Stmt::Break => f.write_str("break;"),
        Stmt::Continue => f.write_str("continue;"),
        Stmt::If { cond, then_branch, else_branch } => {
            write!(f, "if ({}) ", cond)?;
            write_stmt(f, then_branch, level)?;
            if let Some(e) = else_branch {
                f.write_str(" else ")?;
                write_stmt(f, e, level)?;
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            write!(f, "while ({}) ", cond)?;
            write_stmt(f, body, level)
        }
        Stmt::For { init, cond, step, body } => {
            f.write_str("for (")?;
            write_opt(f, init)?;
            f.write_str("; ")?;
            write_opt(f, cond)?;
            f.write_str("; ")?;
            write_opt(f, step)?;
            f.write_str(") ")?;
            write_stmt(f, body, level)
        }
        Stmt::Block(stmts) => write_block(f, stmts, level),
        Stmt::Expr(e) => write!(f, "{};", e),
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = Type::Function(Box::new(self.ty.clone()));
        write!(f, "{} ", c_declarator(&ty, &self.name))?;
        write_block(f, &self.body, 0)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Function(func) => write!(f, "{}", func),
            Declaration::Global(g) => {
                f.write_str(&c_declarator(&g.ty, &g.name))?;
                match &g.init {
                    Some(GlobalInit::Int(v)) => write!(f, " = {}", v)?,
                    Some(GlobalInit::Str { text, .. }) => write!(f, " = {}", text)?,
                    None => {}
                }
                f.write_str(";")
            }
            Declaration::Typedef { name, ty } => write!(f, "typedef {};", c_declarator(ty, name)),
        }
    }
}
