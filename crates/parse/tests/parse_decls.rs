use parse::{parse_program, Declaration, GlobalInit, NoAnnotation, Stmt, Type};
use pretty_assertions::assert_eq;

fn parse_ok(src: &str) -> (Vec<Declaration>, parse::Context) {
    parse_program(src, &mut NoAnnotation).expect("parse ok")
}

fn parse_err(src: &str) -> String {
    let err = parse_program(src, &mut NoAnnotation).expect_err("parse should fail");
    format!("{:#}", err)
}

#[test]
fn initialized_globals() {
    let src = r#"
        int answer = 42;
        int neg = -3;
        char *greeting = "hello";
        int table[16];
    "#;
    let (decls, cx) = parse_ok(src);
    assert_eq!(decls.len(), 4);
    let Declaration::Global(g) = &decls[0] else { panic!("global") };
    assert_eq!(g.init, Some(GlobalInit::Int(42)));
    let Declaration::Global(g) = &decls[1] else { panic!("global") };
    assert_eq!(g.init, Some(GlobalInit::Int(-3)));
    let Declaration::Global(g) = &decls[2] else { panic!("global") };
    assert_eq!(g.ty, Type::pointer_to(Type::Char));
    assert_eq!(g.init, Some(GlobalInit::Str { id: 1, text: "\"hello\"".into() }));
    let Declaration::Global(g) = &decls[3] else { panic!("global") };
    assert_eq!(g.ty, Type::array_of(Type::Int, 16));
    assert!(cx.globals.find("table").is_some());
}

#[test]
fn global_initializer_must_be_literal() {
    let err = parse_err("int a = 1;\nint b = a;\n");
    assert!(err.contains("global initializer"), "{err}");
}

#[test]
fn typedef_registers_alias() {
    let src = "typedef char *string;\nstring name;\n";
    let (decls, cx) = parse_ok(src);
    assert!(matches!(&decls[0], Declaration::Typedef { name, .. } if name == "string"));
    assert_eq!(cx.globals.find("name").unwrap().ty, Type::pointer_to(Type::Char));
}

#[test]
fn typedef_of_struct_definition() {
    let src = r#"
        typedef struct Pair { int a; char b; } pair;
        int main() { pair p; p.a = 1; return p.a; }
    "#;
    let (decls, cx) = parse_ok(src);
    let Declaration::Function(main) = &decls[1] else { panic!("function") };
    let layout = cx.types.lookup_struct("Pair").unwrap();
    assert_eq!(main.locals.find("p").unwrap().size, layout.size());
    assert_eq!(layout.size(), 5);
}

#[test]
fn struct_padding_and_size() {
    let (_, cx) = parse_ok("struct S { char a; int b; };\n");
    let s = cx.types.lookup_struct("S").unwrap();
    assert_eq!(s.member("a").unwrap().offset, 0);
    assert_eq!(s.member("b").unwrap().offset, 4);
    assert_eq!(s.size(), 8);
}

#[test]
fn struct_definition_with_declarator() {
    let (decls, cx) = parse_ok("struct Point { int x; int y; } origin;\n");
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].name(), "origin");
    assert!(cx.types.lookup_struct("Point").is_some());
}

#[test]
fn self_referential_struct_uses_incomplete_pointer() {
    let (_, cx) = parse_ok("struct Node { int v; struct Node *next; };\n");
    let node = cx.types.lookup_struct("Node").unwrap();
    let next = node.member("next").unwrap();
    assert_eq!(next.offset, 4);
    assert_eq!(next.ty, Type::pointer_to(Type::Incomplete("Node".into())));
}

#[test]
fn struct_body_after_forward_use() {
    let src = "struct Later *p;\nstruct Later q { int a; int b; }\n";
    let (decls, cx) = parse_ok(src);
    assert_eq!(decls.len(), 1);
    assert_eq!(cx.types.lookup_struct("Later").unwrap().size(), 8);
}

#[test]
fn typedef_of_forward_struct_sizes_locals_params_and_members() {
    let src = r#"
        typedef struct N N;
        struct N { int v; N *next; };
        struct Box { char tag; N inner; };
        N g;
        int get(N n) { N copy; struct Box b; return 0; }
    "#;
    let (decls, cx) = parse_ok(src);
    let Declaration::Function(get) = &decls[2] else { panic!("function") };
    assert_eq!(get.locals.find("n").unwrap().size, 8);
    assert_eq!(get.locals.find("copy").unwrap().offset, 8);
    assert_eq!(get.locals.find("b").unwrap().offset, 16);
    let boxed = cx.types.lookup_struct("Box").unwrap();
    assert_eq!(boxed.member("inner").unwrap().offset, 4);
    assert_eq!(boxed.size(), 12);
    assert_eq!(get.locals.frame_size(), 28);
}

#[test]
fn struct_redefinition_is_fatal() {
    let err = parse_err("struct S { int a; };\nstruct S { int b; };\n");
    assert!(err.contains("redefinition of struct S"), "{err}");
}

#[test]
fn sizeof_folds_to_constant() {
    let src = r#"
        struct S { char a; int b; };
        typedef struct S s_t;
        int main() { return sizeof(int) + sizeof(char) + sizeof(struct S) + sizeof(s_t *) + sizeof(char **); }
    "#;
    let (decls, _) = parse_ok(src);
    let Declaration::Function(main) = &decls[1] else { panic!("function") };
    let Stmt::Return(Some(e)) = &main.body[0] else { panic!("return") };
    assert_eq!(e.to_string(), "((((4 + 1) + 8) + 4) + 4)");
}

#[test]
fn sizeof_void_is_fatal() {
    let err = parse_err("int main() { return sizeof(void); }\n");
    assert!(err.contains("void"), "{err}");
}

#[test]
fn void_parameter_list_is_empty() {
    let (decls, _) = parse_ok("int main(void) { return 0; }\n");
    let Declaration::Function(main) = &decls[0] else { panic!("function") };
    assert!(main.ty.params.is_empty());
    assert!(main.locals.is_empty());
}

#[test]
fn parameters_are_first_locals() {
    let (decls, _) = parse_ok("int f(char c, int n, int v[4]) { int t; return n; }\n");
    let Declaration::Function(f) = &decls[0] else { panic!("function") };
    let offsets: Vec<(String, usize)> = f.locals.iter().map(|v| (v.name.clone(), v.offset)).collect();
    assert_eq!(
        offsets,
        vec![("c".into(), 0), ("n".into(), 4), ("v".into(), 8), ("t".into(), 12)]
    );
    assert_eq!(f.ty.params[2].ty, Type::pointer_to(Type::Int));
}

#[test]
fn local_declared_before_its_initializer() {
    let (decls, _) = parse_ok("int main() { int x = 1; int y = x + 1; return y; }\n");
    let Declaration::Function(main) = &decls[0] else { panic!("function") };
    let Stmt::VarDecl { init: Some(e), offset, .. } = &main.body[1] else { panic!("decl") };
    assert_eq!(*offset, 4);
    assert_eq!(e.to_string(), "(x + 1)");
}

#[test]
fn string_ids_increase_across_functions() {
    let src = r#"
        char *a = "one";
        int f() { puts("two"); return 0; }
        int main() { puts("three"); puts("two"); return 0; }
    "#;
    let (_, cx) = parse_ok(src);
    let ids: Vec<usize> = cx.strings.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn missing_semicolon_reports_position() {
    let err = parse_err("int main() {\n  return 1\n}\n");
    assert!(err.contains("3:1"), "{err}");
    assert!(err.contains("expected ';'"), "{err}");
}

#[test]
fn leading_underscore_is_a_lex_error() {
    assert!(parse_program("int _x;\n", &mut NoAnnotation).is_err());
}
