use anyhow::{bail, Context, Result};
use parse::{Annotate, BinaryOp, Expr, ExprKind, Field, Stmt, Type, TypeTable, UnaryOp};
use tracing::trace;

/// Assigns a type to every expression of a statement and resolves struct
/// member accesses. Runs once per top-level statement, right after it is
/// parsed.
#[derive(Debug, Default)]
pub struct TypeAnnotator;

impl Annotate for TypeAnnotator {
    fn annotate(&mut self, stmt: &mut Stmt, types: &TypeTable) -> Result<()> {
        annotate_stmt(stmt, types)
    }
}

pub fn annotate_stmt(stmt: &mut Stmt, types: &TypeTable) -> Result<()> {
    match stmt {
        Stmt::VarDecl { name, init, .. } => {
            if let Some(e) = init {
                annotate_expr(e, types).with_context(|| format!("in initializer of '{}'", name))?;
            }
        }
        Stmt::Return(Some(e)) | Stmt::Expr(e) => annotate_expr(e, types)?,
        Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        Stmt::If { cond, then_branch, else_branch } => {
            annotate_expr(cond, types)?;
            annotate_stmt(then_branch, types)?;
            if let Some(e) = else_branch {
                annotate_stmt(e, types)?;
            }
        }
        Stmt::While { cond, body } => {
            annotate_expr(cond, types)?;
            annotate_stmt(body, types)?;
        }
        Stmt::For { init, cond, step, body } => {
            for e in [init, cond, step].into_iter().flatten() {
                annotate_expr(e, types)?;
            }
            annotate_stmt(body, types)?;
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                annotate_stmt(s, types)?;
            }
        }
    }
    Ok(())
}

/// Post-order: children are typed before their parent.
pub fn annotate_expr(expr: &mut Expr, types: &TypeTable) -> Result<()> {
    let ty = match &mut expr.kind {
        ExprKind::Num(_) => Type::Int,
        ExprKind::Str { .. } => Type::pointer_to(Type::Char),
        ExprKind::Local { name, .. } | ExprKind::Global { name } => match &expr.ty {
            Some(t) => t.clone(),
            None => bail!("variable '{}' has no type", name),
        },
        ExprKind::Unresolved(name) => bail!("use of undeclared identifier '{}'", name),
        ExprKind::Unary { op, operand } => {
            annotate_expr(operand, types)?;
            let t = operand.ty()?;
            match op {
                UnaryOp::Neg | UnaryOp::LogicalNot => t.clone(),
                UnaryOp::AddrOf => Type::pointer_to(t.clone()),
                UnaryOp::Deref => match t.pointee() {
                    Some(inner) => inner.clone(),
                    None => bail!("cannot dereference '{}' of type '{}'", operand, t),
                },
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            annotate_expr(lhs, types)?;
            annotate_expr(rhs, types)?;
            let (lt, rt) = (lhs.ty()?, rhs.ty()?);
            match op {
                BinaryOp::Add | BinaryOp::Sub => additive_type(*op, lt, rt)?,
                _ => lt.clone(),
            }
        }
        ExprKind::Assign { lhs, rhs } => {
            annotate_expr(rhs, types)?;
            annotate_expr(lhs, types)?;
            lhs.ty()?.clone()
        }
        ExprKind::Member { base, field, arrow } => {
            annotate_expr(base, types)?;
            let base_ty = base.ty()?;
            let container = if *arrow {
                match base_ty {
                    Type::Pointer(inner) => inner.as_ref(),
                    other => bail!("'->{}' applied to non-pointer type '{}'", field.name(), other),
                }
            } else {
                base_ty
            };
            let layout = types
                .struct_layout(container)
                .with_context(|| format!("member access '{}'", field.name()))?;
            let member = layout.member(field.name())?;
            trace!(member = %member.name, offset = member.offset, "resolved member");
            let ty = member.ty.clone();
            *field = Field::Resolved { name: member.name.clone(), offset: member.offset, ty: ty.clone() };
            ty
        }
        ExprKind::Call { args, .. } => {
            for a in args.iter_mut() {
                annotate_expr(a, types)?;
            }
            Type::Void
        }
    };
    expr.ty = Some(ty);
    Ok(())
}

fn additive_type(op: BinaryOp, lt: &Type, rt: &Type) -> Result<Type> {
    match (lt.is_pointer_like(), rt.is_pointer_like()) {
        (true, true) if op == BinaryOp::Sub => Ok(Type::Int),
        (true, true) => bail!("cannot add two pointers ('{}' and '{}')", lt, rt),
        (true, false) => Ok(lt.decay()),
        (false, true) => Ok(rt.decay()),
        (false, false) => Ok(lt.clone()),
    }
}
