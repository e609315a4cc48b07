use anyhow::{anyhow, bail, ensure, Result};
use parse::{BinaryOp, Expr, ExprKind, Function, Stmt, Type, TypeTable, UnaryOp, WORD_SIZE};
use std::fmt::{self, Write as _};
use tracing::{debug, trace};

use crate::codegen::CodeGen;

/// Registers a0..a7.
pub const MAX_REG_ARGS: usize = 8;

macro_rules! ins {
    ($em:expr, $($arg:tt)*) => {
        $em.ins(format_args!($($arg)*))
    };
}

/// Stack-machine lowering of one function. Every expression leaves exactly
/// one word on the stack; `t0`..`t3` are scratch.
pub(crate) struct FunctionEmitter<'a> {
    cg: &'a mut CodeGen,
    types: &'a TypeTable,
    func: &'a Function,
    frame_size: usize,
    // (continue label, break label) of each enclosing loop
    loop_stack: Vec<(String, String)>,
    // bytes pushed below the frame by expression evaluation
    depth: usize,
}

impl<'a> FunctionEmitter<'a> {
    pub(crate) fn new(cg: &'a mut CodeGen, types: &'a TypeTable, func: &'a Function) -> Self {
        Self {
            cg,
            types,
            func,
            frame_size: func.locals.frame_size(),
            loop_stack: Vec::new(),
            depth: 0,
        }
    }

    fn ins(&mut self, args: fmt::Arguments<'_>) {
        let _ = writeln!(self.cg.buf, "  {}", args);
    }

    fn label(&mut self, name: &str) {
        let _ = writeln!(self.cg.buf, "{}:", name);
    }

    fn push(&mut self, reg: &str) {
        ins!(self, "addi sp, sp, -4");
        ins!(self, "sw {}, 0(sp)", reg);
        self.depth += 4;
    }

    fn pop(&mut self, reg: &str) -> Result<()> {
        ensure!(self.depth >= 4, "internal error: operand stack underflow");
        ins!(self, "lw {}, 0(sp)", reg);
        ins!(self, "addi sp, sp, 4");
        self.depth -= 4;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        ensure!(self.depth >= 4, "internal error: operand stack underflow");
        ins!(self, "addi sp, sp, 4");
        self.depth -= 4;
        Ok(())
    }

    // `addi` only takes a 12-bit signed immediate
    fn add_imm(&mut self, dst: &str, src: &str, imm: i64) {
        if (-2048..=2047).contains(&imm) {
            ins!(self, "addi {}, {}, {}", dst, src, imm);
        } else {
            ins!(self, "li t3, {}", imm);
            ins!(self, "add {}, {}, t3", dst, src);
        }
    }

    fn adjust_sp(&mut self, delta: i64) {
        if delta != 0 {
            self.add_imm("sp", "sp", delta);
        }
    }

    fn size_of(&self, ty: &Type) -> Result<usize> {
        self.types.size_of(ty)
    }

    pub(crate) fn emit(mut self) -> Result<()> {
        let f = self.func;
        ensure!(
            f.ty.params.len() <= MAX_REG_ARGS,
            "function {} takes {} parameters, at most {} are supported",
            f.name,
            f.ty.params.len(),
            MAX_REG_ARGS
        );
        debug!(function = %f.name, frame_size = self.frame_size, locals = f.locals.len(), "generating function");

        ins!(self, ".text");
        ins!(self, ".align 4");
        ins!(self, ".globl {}", f.name);
        ins!(self, ".type {}, @function", f.name);
        self.label(&f.name);

        ins!(self, "addi sp, sp, -4");
        ins!(self, "sw fp, 0(sp)");
        self.adjust_sp(-(self.frame_size as i64));
        ins!(self, "mv fp, sp");
        // parameters are the first locals, in order
        for (i, var) in f.locals.iter().take(f.ty.params.len()).enumerate() {
            self.add_imm("t0", "fp", var.offset as i64);
            self.store(&format!("a{}", i), "t0", &var.ty)?;
        }

        for stmt in &f.body {
            self.gen_stmt(stmt)?;
            ensure!(self.depth == 0, "internal error: operand stack unbalanced after `{}`", stmt);
        }
        Ok(())
    }

    fn emit_return(&mut self) {
        self.adjust_sp(self.frame_size as i64);
        ins!(self, "lw fp, 0(sp)");
        ins!(self, "addi sp, sp, 4");
        ins!(self, "ret");
    }

    /// Load through the address in `reg`. Arrays are left as their address.
    fn load(&mut self, reg: &str, ty: &Type) -> Result<()> {
        if matches!(ty, Type::Array(..)) {
            return Ok(());
        }
        match self.size_of(ty)? {
            4 => ins!(self, "lw {}, 0({})", reg, reg),
            1 => ins!(self, "lb {}, 0({})", reg, reg),
            n => bail!("invalid size of type '{}': {}", ty, n),
        }
        Ok(())
    }

    fn store(&mut self, val: &str, addr: &str, ty: &Type) -> Result<()> {
        match self.size_of(ty)? {
            4 => ins!(self, "sw {}, 0({})", val, addr),
            1 => {
                ins!(self, "andi {}, {}, 0xFF", val, val);
                ins!(self, "sb {}, 0({})", val, addr);
            }
            n => bail!("invalid size of type '{}': {}", ty, n),
        }
        Ok(())
    }

    /// Replace the address on top of the stack with the value it points to.
    fn load_top(&mut self, ty: &Type) -> Result<()> {
        if matches!(ty, Type::Array(..)) {
            return Ok(());
        }
        self.pop("t0")?;
        self.load("t0", ty)?;
        self.push("t0");
        Ok(())
    }

    fn gen_lval(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Local { offset, .. } => {
                self.add_imm("t0", "fp", *offset as i64);
                self.push("t0");
            }
            ExprKind::Global { name } => {
                ins!(self, "lui t0, %hi({})", name);
                ins!(self, "addi t0, t0, %lo({})", name);
                self.push("t0");
            }
            ExprKind::Unary { op: UnaryOp::Deref, operand } => self.gen_expr(operand)?,
            ExprKind::Member { base, field, arrow } => {
                if *arrow {
                    self.gen_expr(base)?;
                } else {
                    self.gen_lval(base)?;
                }
                let offset = field.offset()?;
                self.pop("t0")?;
                self.add_imm("t0", "t0", offset as i64);
                self.push("t0");
            }
            _ => bail!("'{}' is not an lvalue", e),
        }
        Ok(())
    }

    fn gen_expr(&mut self, e: &Expr) -> Result<()> {
        trace!(expr = %e, "gen");
        match &e.kind {
            ExprKind::Num(v) => {
                ins!(self, "li t0, {}", v);
                self.push("t0");
            }
            ExprKind::Str { id, .. } => {
                ins!(self, "lui t0, %hi(.L.C{})", id);
                ins!(self, "addi t0, t0, %lo(.L.C{})", id);
                self.push("t0");
            }
            ExprKind::Local { .. } | ExprKind::Global { .. } | ExprKind::Member { .. } => {
                self.gen_lval(e)?;
                self.load_top(e.ty()?)?;
            }
            ExprKind::Unresolved(name) => bail!("use of undeclared identifier '{}'", name),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::AddrOf => self.gen_lval(operand)?,
                UnaryOp::Deref => {
                    self.gen_expr(operand)?;
                    self.load_top(e.ty()?)?;
                }
                UnaryOp::Neg => {
                    self.gen_expr(operand)?;
                    self.pop("t0")?;
                    ins!(self, "sub t0, zero, t0");
                    self.push("t0");
                }
                UnaryOp::LogicalNot => {
                    self.gen_expr(operand)?;
                    self.pop("t0")?;
                    ins!(self, "seqz t0, t0");
                    self.push("t0");
                }
            },
            ExprKind::Binary { op: op @ (BinaryOp::LogicalAnd | BinaryOp::LogicalOr), lhs, rhs } => {
                let id = self.cg.new_label();
                let (branch, end) = if *op == BinaryOp::LogicalAnd {
                    ("beqz", format!(".L.and.end.{}", id))
                } else {
                    ("bnez", format!(".L.or.end.{}", id))
                };
                self.gen_expr(lhs)?;
                self.pop("t0")?;
                ins!(self, "snez t0, t0");
                ins!(self, "{} t0, {}", branch, end);
                self.gen_expr(rhs)?;
                self.pop("t0")?;
                ins!(self, "snez t0, t0");
                self.label(&end);
                self.push("t0");
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.pop("t0")?;
                self.pop("t1")?;
                self.gen_binary(*op, lhs.ty()?, rhs.ty()?)?;
                self.push("t0");
            }
            ExprKind::Assign { lhs, rhs } => {
                self.gen_expr(rhs)?;
                self.gen_lval(lhs)?;
                self.pop("t1")?;
                self.pop("t0")?;
                self.store("t0", "t1", lhs.ty()?)?;
                self.push("t0");
            }
            ExprKind::Call { name, args } => self.gen_call(name, args)?,
        }
        Ok(())
    }

    /// `t1` holds the left operand, `t0` the right; the result goes to `t0`.
    fn gen_binary(&mut self, op: BinaryOp, lt: &Type, rt: &Type) -> Result<()> {
        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                if op == BinaryOp::Sub && lt.is_pointer_like() && rt.is_pointer_like() {
                    ins!(self, "sub t0, t1, t0");
                    self.scale("t0", lt, true)?;
                    return Ok(());
                }
                if lt.is_pointer_like() {
                    self.scale("t0", lt, false)?;
                } else if rt.is_pointer_like() {
                    self.scale("t1", rt, false)?;
                }
                let mnemonic = if op == BinaryOp::Add { "add" } else { "sub" };
                ins!(self, "{} t0, t1, t0", mnemonic);
            }
            BinaryOp::Mul => ins!(self, "mul t0, t1, t0"),
            BinaryOp::Div => ins!(self, "div t0, t1, t0"),
            BinaryOp::Mod => ins!(self, "rem t0, t1, t0"),
            BinaryOp::BitAnd => ins!(self, "and t0, t1, t0"),
            BinaryOp::BitOr => ins!(self, "or t0, t1, t0"),
            BinaryOp::BitXor => ins!(self, "xor t0, t1, t0"),
            BinaryOp::Lt => ins!(self, "slt t0, t1, t0"),
            BinaryOp::Gt => ins!(self, "sgt t0, t1, t0"),
            BinaryOp::Le => {
                ins!(self, "slt t2, t1, t0");
                self.equal_into_t3();
                ins!(self, "or t0, t2, t3");
            }
            BinaryOp::Ge => {
                ins!(self, "slt t2, t0, t1");
                self.equal_into_t3();
                ins!(self, "or t0, t2, t3");
            }
            BinaryOp::Eq => {
                ins!(self, "slt t2, t1, t0");
                ins!(self, "slt t3, t0, t1");
                ins!(self, "or t1, t2, t3");
                ins!(self, "li t0, 1");
                ins!(self, "sub t0, t0, t1");
            }
            BinaryOp::Ne => {
                ins!(self, "sub t0, t1, t0");
                ins!(self, "snez t0, t0");
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                bail!("internal error: short-circuit operator reached gen_binary")
            }
        }
        Ok(())
    }

    // t3 = (t0 == t1)
    fn equal_into_t3(&mut self) {
        ins!(self, "sub t3, t0, t1");
        ins!(self, "snez t3, t3");
        ins!(self, "neg t3, t3");
        ins!(self, "addi t3, t3, 1");
    }

    /// Multiply (or divide, for a pointer difference) `reg` by the size of
    /// what `ptr` points to.
    fn scale(&mut self, reg: &str, ptr: &Type, divide: bool) -> Result<()> {
        let pointee = ptr
            .pointee()
            .ok_or_else(|| anyhow!("internal error: '{}' is not a pointer", ptr))?;
        let size = self.size_of(pointee)?;
        if size != 1 {
            ins!(self, "li t2, {}", size);
            ins!(self, "{} {}, {}, t2", if divide { "div" } else { "mul" }, reg, reg);
        }
        Ok(())
    }

    fn gen_call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        ensure!(
            args.len() <= MAX_REG_ARGS,
            "call to {} passes {} arguments, at most {} are supported",
            name,
            args.len(),
            MAX_REG_ARGS
        );
        for a in args.iter().rev() {
            self.gen_expr(a)?;
        }
        for i in 0..args.len() {
            self.pop(&format!("a{}", i))?;
        }
        self.push("ra");
        self.push("s1");
        // `andi` below only realigns correctly when sp is word aligned: the
        // saved fp, the frame and the operand stack must all be whole words
        let below_entry = WORD_SIZE + self.frame_size + self.depth;
        ensure!(
            below_entry % WORD_SIZE == 0,
            "internal error: sp misaligned by {} bytes before call to {}",
            below_entry % WORD_SIZE,
            name
        );
        ins!(self, "andi s1, sp, 0xF");
        ins!(self, "sub sp, sp, s1");
        ins!(self, "call {}", name);
        ins!(self, "add sp, sp, s1");
        self.pop("s1")?;
        self.pop("ra")?;
        self.push("a0");
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        trace!(stmt = %stmt, "gen");
        match stmt {
            Stmt::VarDecl { offset, ty, init, .. } => {
                if let Some(e) = init {
                    self.gen_expr(e)?;
                    self.pop("t0")?;
                    self.add_imm("t1", "fp", *offset as i64);
                    self.store("t0", "t1", ty)?;
                }
            }
            Stmt::Expr(e) => {
                self.gen_expr(e)?;
                self.discard()?;
            }
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.gen_expr(e)?;
                    self.pop("a0")?;
                }
                self.emit_return();
            }
            Stmt::Break => {
                let (_, brk) = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| anyhow!("'break' outside of a loop"))?;
                ins!(self, "j {}", brk);
            }
            Stmt::Continue => {
                let (cont, _) = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| anyhow!("'continue' outside of a loop"))?;
                ins!(self, "j {}", cont);
            }
            Stmt::If { cond, then_branch, else_branch } => {
                let id = self.cg.new_label();
                self.gen_expr(cond)?;
                self.pop("t0")?;
                ins!(self, "beqz t0, .L.else{}", id);
                self.gen_stmt(then_branch)?;
                ins!(self, "j .L.if.end{}", id);
                self.label(&format!(".L.else{}", id));
                if let Some(e) = else_branch {
                    self.gen_stmt(e)?;
                }
                self.label(&format!(".L.if.end{}", id));
            }
            Stmt::While { cond, body } => {
                let id = self.cg.new_label();
                self.label(&format!(".L.loop.cond{}", id));
                self.gen_expr(cond)?;
                self.pop("t0")?;
                ins!(self, "beqz t0, .L.loop.end{}", id);
                self.gen_loop_body(id, body)?;
                ins!(self, "j .L.loop.cond{}", id);
                self.label(&format!(".L.loop.end{}", id));
            }
            Stmt::For { init, cond, step, body } => {
                let id = self.cg.new_label();
                if let Some(e) = init {
                    self.gen_expr(e)?;
                    self.discard()?;
                }
                self.label(&format!(".L.loop.cond{}", id));
                if let Some(e) = cond {
                    self.gen_expr(e)?;
                    self.pop("t0")?;
                    ins!(self, "beqz t0, .L.loop.end{}", id);
                }
                self.gen_loop_body(id, body)?;
                if let Some(e) = step {
                    self.gen_expr(e)?;
                    self.discard()?;
                }
                ins!(self, "j .L.loop.cond{}", id);
                self.label(&format!(".L.loop.end{}", id));
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s)?;
                }
            }
        }
        Ok(())
    }

    /// Body followed by the `continue` target.
    fn gen_loop_body(&mut self, id: usize, body: &Stmt) -> Result<()> {
        let next = format!(".L.loop.next{}", id);
        self.loop_stack.push((next.clone(), format!(".L.loop.end{}", id)));
        let res = self.gen_stmt(body);
        self.loop_stack.pop();
        res?;
        self.label(&next);
        Ok(())
    }
}
