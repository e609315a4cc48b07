use backend::{compile, CodeGen};
use parse::{Parser, NoAnnotation};

fn asm(src: &str) -> String {
    compile(src, "globals.c").expect("compile ok")
}

#[test]
fn int_global_with_initializer() {
    let out = asm("int answer = 42;\n");
    let expected = "\
  .globl answer
  .section .sdata,\"aw\"
  .type answer, @object
  .size answer, 4
  .balign 8
answer:
  .word 42
";
    assert!(out.contains(expected), "{out}");
}

#[test]
fn string_global_points_at_rodata() {
    let out = asm("char *msg = \"hi\\n\";\n");
    assert!(out.contains("msg:\n  .word .L.C1\n"), "{out}");
    assert!(out.ends_with("  .section .rodata\n  .balign 4\n.L.C1:\n  .string \"hi\\n\"\n"), "{out}");
}

#[test]
fn uninitialized_array_is_zero_filled() {
    let out = asm("int table[3];\nchar flag;\n");
    assert!(out.contains("  .size table, 12\n  .balign 8\ntable:\n  .zero 12\n"), "{out}");
    assert!(out.contains("flag:\n  .zero 1\n"), "{out}");
}

#[test]
fn char_global_with_initializer_is_a_byte() {
    let out = asm("char c = 65;\n");
    assert!(out.contains("c:\n  .byte 65\n"), "{out}");
}

#[test]
fn string_into_char_array_is_rejected() {
    let err = compile("char buf[8] = \"x\";\n", "g.c").unwrap_err();
    assert!(format!("{:#}", err).contains("while generating global `buf`"));
}

#[test]
fn global_access_uses_hi_lo() {
    let out = asm("int g;\nint main() { g = 3; return g; }\n");
    assert!(out.contains("lui t0, %hi(g)\n  addi t0, t0, %lo(g)\n"), "{out}");
}

#[test]
fn streaming_output_can_be_drained_per_declaration() {
    let src = "int a = 1;\nint main() { return a; }\n";
    let mut parser = Parser::new(src).unwrap();
    let mut cg = CodeGen::new();
    let mut chunks = Vec::new();
    while let Some(decl) = parser.next_declaration(&mut NoAnnotation).unwrap() {
        cg.emit_declaration(&decl, &parser.context().types).unwrap();
        chunks.push(cg.take_output());
    }
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].contains("a:\n  .word 1\n"));
    assert!(chunks[1].contains("main:\n"));
    assert!(cg.finish().is_empty());
}

#[test]
fn objects_beyond_32_bit_offsets_are_rejected() {
    let err = compile("typedef int row[1073741824];\nrow grid[4];\n", "g.c").unwrap_err();
    assert!(format!("{:#}", err).contains("too large"), "{err:#}");
    let err = compile("int main() { int a[600000000]; return 0; }\n", "g.c").unwrap_err();
    assert!(format!("{:#}", err).contains("too large"), "{err:#}");
}
