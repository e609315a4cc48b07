mod codegen;
mod function;

use anyhow::{Context, Result};
use parse::{Declaration, Parser};
use sema::TypeAnnotator;
use std::io::Write;
use tracing::debug;

pub use codegen::CodeGen;
pub use function::MAX_REG_ARGS;

fn decl_kind(decl: &Declaration) -> &'static str {
    match decl {
        Declaration::Function(_) => "function",
        Declaration::Global(_) => "global",
        Declaration::Typedef { .. } => "typedef",
    }
}

/// Compile one translation unit, writing each declaration's assembly to
/// `out` as soon as it is generated. `on_decl` sees every declaration
/// before it is emitted. On error, output for earlier declarations has
/// already been written.
pub fn compile_to<W: Write>(
    src: &str,
    file_name: &str,
    out: &mut W,
    mut on_decl: impl FnMut(&Declaration),
) -> Result<()> {
    let mut parser = Parser::new(src)?;
    let mut annotator = TypeAnnotator;
    let mut cg = CodeGen::new();
    cg.emit_header(file_name);
    while let Some(decl) = parser.next_declaration(&mut annotator)? {
        debug!(kind = decl_kind(&decl), name = decl.name(), "parsed declaration");
        on_decl(&decl);
        cg.emit_declaration(&decl, &parser.context().types)?;
        out.write_all(cg.take_output().as_bytes()).context("failed to write assembly")?;
    }
    cg.emit_constant_strings(&parser.context().strings);
    out.write_all(cg.finish().as_bytes()).context("failed to write assembly")?;
    Ok(())
}

/// Run the whole pipeline over one translation unit and return the assembly.
pub fn compile(src: &str, file_name: &str) -> Result<String> {
    let mut out = Vec::new();
    compile_to(src, file_name, &mut out, |_| {})?;
    String::from_utf8(out).context("generated assembly is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_input_file() {
        let asm = compile("int main() { return 0; }\n", "prog.c").unwrap();
        assert!(asm.starts_with("  .file \"prog.c\"\n  .option nopic\n  .align 4\n"), "{asm}");
    }

    #[test]
    fn prologue_and_epilogue() {
        let asm = compile("int main() { int x; return 7; }\n", "t.c").unwrap();
        let expected = "\
main:
  addi sp, sp, -4
  sw fp, 0(sp)
  addi sp, sp, -4
  mv fp, sp
  li t0, 7
  addi sp, sp, -4
  sw t0, 0(sp)
  lw a0, 0(sp)
  addi sp, sp, 4
  addi sp, sp, 4
  lw fp, 0(sp)
  addi sp, sp, 4
  ret
";
        assert!(asm.contains(expected), "{asm}");
    }

    #[test]
    fn typedefs_and_prototypes_emit_nothing() {
        let asm = compile("typedef int num;\nint f(int a);\n", "t.c").unwrap();
        assert_eq!(asm.lines().count(), 3, "{asm}");
    }

    #[test]
    fn break_outside_loop_is_fatal() {
        let err = compile("int main() { break; }\n", "t.c").unwrap_err();
        assert!(format!("{:#}", err).contains("outside of a loop"));
    }

    #[test]
    fn too_many_arguments_is_fatal() {
        let err = compile("int main() { return f(1,2,3,4,5,6,7,8,9); }\n", "t.c").unwrap_err();
        assert!(format!("{:#}", err).contains("at most 8"));
    }

    #[test]
    fn compile_to_streams_until_the_first_error() {
        let mut out = Vec::new();
        let mut seen = Vec::new();
        let src = "int ok() { return 1; }\nint bad() { return y; }\n";
        let err = compile_to(src, "t.c", &mut out, |d| seen.push(d.name().to_string())).unwrap_err();
        assert!(format!("{:#}", err).contains("undeclared identifier 'y'"));
        assert_eq!(seen, vec!["ok"]);
        let asm = String::from_utf8(out).unwrap();
        assert!(asm.starts_with("  .file \"t.c\"\n"), "{asm}");
        assert!(asm.contains("ok:\n") && !asm.contains("bad:"), "{asm}");
    }
}
