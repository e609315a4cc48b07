use anyhow::{bail, Context, Result};
use parse::{Declaration, GlobalInit, GlobalVariable, StringPool, TypeTable};
use std::fmt::Write as _;
use tracing::debug;

use crate::function::FunctionEmitter;

/// Streaming RV32 assembly writer. Declarations are emitted one at a time,
/// in source order; the constant-string pool goes last.
#[derive(Debug, Default)]
pub struct CodeGen {
    pub(crate) buf: String,
    next_label: usize,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label ids are unique across the whole compilation.
    pub(crate) fn new_label(&mut self) -> usize {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    pub fn emit_header(&mut self, file_name: &str) {
        let _ = writeln!(self.buf, "  .file \"{}\"", file_name);
        let _ = writeln!(self.buf, "  .option nopic");
        let _ = writeln!(self.buf, "  .align 4");
    }

    pub fn emit_declaration(&mut self, decl: &Declaration, types: &TypeTable) -> Result<()> {
        match decl {
            Declaration::Function(f) => FunctionEmitter::new(self, types, f)
                .emit()
                .with_context(|| format!("while generating function `{}`", f.name)),
            Declaration::Global(g) => self
                .emit_global(g, types)
                .with_context(|| format!("while generating global `{}`", g.name)),
            Declaration::Typedef { .. } => Ok(()),
        }
    }

    fn emit_global(&mut self, g: &GlobalVariable, types: &TypeTable) -> Result<()> {
        let size = types.size_of(&g.ty)?;
        debug!(global = %g.name, size, "generating global");
        let _ = writeln!(self.buf, "  .globl {}", g.name);
        let _ = writeln!(self.buf, "  .section .sdata,\"aw\"");
        let _ = writeln!(self.buf, "  .type {}, @object", g.name);
        let _ = writeln!(self.buf, "  .size {}, {}", g.name, size);
        let _ = writeln!(self.buf, "  .balign 8");
        let _ = writeln!(self.buf, "{}:", g.name);
        match (&g.init, size) {
            (None, _) => {
                let _ = writeln!(self.buf, "  .zero {}", size);
            }
            (Some(GlobalInit::Int(v)), 4) => {
                let _ = writeln!(self.buf, "  .word {}", v);
            }
            (Some(GlobalInit::Int(v)), 1) => {
                let _ = writeln!(self.buf, "  .byte {}", v & 0xFF);
            }
            (Some(GlobalInit::Str { id, .. }), 4) => {
                let _ = writeln!(self.buf, "  .word .L.C{}", id);
            }
            (Some(_), n) => bail!("cannot initialize a {}-byte object of type '{}' with a literal", n, g.ty),
        }
        Ok(())
    }

    pub fn emit_constant_strings(&mut self, strings: &StringPool) {
        for s in strings.iter() {
            let _ = writeln!(self.buf, "  .section .rodata");
            let _ = writeln!(self.buf, "  .balign 4");
            let _ = writeln!(self.buf, ".L.C{}:", s.id);
            let _ = writeln!(self.buf, "  .string {}", s.text);
        }
    }

    /// Hand out everything emitted so far, leaving the buffer empty.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
