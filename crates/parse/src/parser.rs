use anyhow::{anyhow, Context as _, Result};
use lex::{line_col, tokenize, Keyword as Kw, Punctuator as P, Token, TokenKind as K};

use crate::ast::*;
use crate::symbols::{GlobalInit, GlobalVariable, Locals};
use crate::types::{FunctionType, Param, StructLayout, Type};
use crate::{Annotate, Context};

// Binding powers, (left, right). Assignment is right-associative, every
// other infix operator is left-associative.
const ASSIGN_BP: (u8, u8) = (21, 20);
const LOGICAL_OR_BP: (u8, u8) = (40, 41);
const LOGICAL_AND_BP: (u8, u8) = (50, 51);
const BIT_OR_BP: (u8, u8) = (60, 61);
const BIT_XOR_BP: (u8, u8) = (70, 71);
const BIT_AND_BP: (u8, u8) = (80, 81);
const EQUALITY_BP: (u8, u8) = (90, 91);
const RELATIONAL_BP: (u8, u8) = (100, 101);
const ADDITIVE_BP: (u8, u8) = (120, 121);
const MULTIPLICATIVE_BP: (u8, u8) = (130, 131);
const PREFIX_BP: u8 = 151;
const POSTFIX_BP: u8 = 200;

#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Assign,
    Member { arrow: bool },
    Index,
}

fn infix_binding_power(p: P) -> Option<(u8, u8, Infix)> {
    let (bp, op) = match p {
        P::Assign => (ASSIGN_BP, Infix::Assign),
        P::OrOr => (LOGICAL_OR_BP, Infix::Binary(BinaryOp::LogicalOr)),
        P::AndAnd => (LOGICAL_AND_BP, Infix::Binary(BinaryOp::LogicalAnd)),
        P::Pipe => (BIT_OR_BP, Infix::Binary(BinaryOp::BitOr)),
        P::Caret => (BIT_XOR_BP, Infix::Binary(BinaryOp::BitXor)),
        P::Amp => (BIT_AND_BP, Infix::Binary(BinaryOp::BitAnd)),
        P::Eq => (EQUALITY_BP, Infix::Binary(BinaryOp::Eq)),
        P::Ne => (EQUALITY_BP, Infix::Binary(BinaryOp::Ne)),
        P::Lt => (RELATIONAL_BP, Infix::Binary(BinaryOp::Lt)),
        P::Le => (RELATIONAL_BP, Infix::Binary(BinaryOp::Le)),
        P::Gt => (RELATIONAL_BP, Infix::Binary(BinaryOp::Gt)),
        P::Ge => (RELATIONAL_BP, Infix::Binary(BinaryOp::Ge)),
        P::Plus => (ADDITIVE_BP, Infix::Binary(BinaryOp::Add)),
        P::Minus => (ADDITIVE_BP, Infix::Binary(BinaryOp::Sub)),
        P::Star => (MULTIPLICATIVE_BP, Infix::Binary(BinaryOp::Mul)),
        P::Slash => (MULTIPLICATIVE_BP, Infix::Binary(BinaryOp::Div)),
        P::Percent => (MULTIPLICATIVE_BP, Infix::Binary(BinaryOp::Mod)),
        P::Dot => ((POSTFIX_BP, POSTFIX_BP + 1), Infix::Member { arrow: false }),
        P::Arrow => ((POSTFIX_BP, POSTFIX_BP + 1), Infix::Member { arrow: true }),
        P::LBracket => ((POSTFIX_BP, 0), Infix::Index),
        _ => return None,
    };
    Some((bp.0, bp.1, op))
}

/// Result of reading a type and an optional declarator name. The name is
/// absent only after a bare `struct tag { ... }` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAndName {
    pub ty: Type,
    pub name: Option<String>,
}

pub struct Parser<'src> {
    src: &'src str,
    toks: Vec<Token<'src>>,
    pos: usize,
    cx: Context,
}

impl<'src> Parser<'src> {
    pub fn new(src: &'src str) -> Result<Self> {
        Self::with_context(src, Context::default())
    }

    pub fn with_context(src: &'src str, cx: Context) -> Result<Self> {
        let toks = tokenize(src)?;
        Ok(Self { src, toks, pos: 0, cx })
    }

    pub fn context(&self) -> &Context { &self.cx }
    pub fn into_context(self) -> Context { self.cx }

    // The token vector always ends with Eof, so peeking past it stays on Eof.
    fn peek(&self) -> Token<'src> { self.peek_n(0) }
    fn peek_n(&self, n: usize) -> Token<'src> {
        let i = (self.pos + n).min(self.toks.len() - 1);
        self.toks[i]
    }
    fn bump(&mut self) -> Token<'src> {
        let t = self.peek();
        if t.kind != K::Eof {
            self.pos += 1;
        }
        t
    }
    pub fn at_eof(&self) -> bool { self.peek().kind == K::Eof }

    fn error_at(&self, tok: Token<'_>, msg: &str) -> anyhow::Error {
        let (line, col) = line_col(self.src, tok.span.start);
        if tok.kind == K::Eof {
            anyhow!("{}:{}: {}, got end of input", line, col, msg)
        } else {
            anyhow!("{}:{}: {}, got '{}'", line, col, msg, tok.text)
        }
    }

    fn expect_punct(&mut self, p: P) -> Result<()> {
        let t = self.peek();
        if t.is_punct(p) {
            self.pos += 1;
            return Ok(());
        }
        Err(self.error_at(t, &format!("expected '{}'", p.as_str())))
    }

    fn consume_punct(&mut self, p: P) -> bool {
        if self.peek().is_punct(p) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn consume_keyword(&mut self, kw: Kw) -> bool {
        if self.peek().is_keyword(kw) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_ident(&mut self) -> Result<String> {
        let t = self.peek();
        if t.kind == K::Identifier {
            self.pos += 1;
            return Ok(t.text.to_string());
        }
        Err(self.error_at(t, "expected identifier"))
    }

    fn expect_array_len(&mut self) -> Result<usize> {
        let t = self.peek();
        match t.kind {
            K::Int(n) if n >= 0 => {
                self.pos += 1;
                Ok(n as usize)
            }
            _ => Err(self.error_at(t, "expected array length")),
        }
    }

    /// Read a type and, unless the input is a bare struct definition, the
    /// declared name with an optional `[N]` or parameter-list suffix.
    /// Returns `None` without consuming anything when no type starts here.
    pub fn parse_type_and_name(&mut self) -> Result<Option<TypeAndName>> {
        let t = self.peek();
        let mut ty = match t.kind {
            K::Keyword(Kw::Int) => { self.pos += 1; Type::Int }
            K::Keyword(Kw::Char) => { self.pos += 1; Type::Char }
            K::Keyword(Kw::Void) => { self.pos += 1; Type::Void }
            K::Keyword(Kw::Struct) => {
                self.pos += 1;
                let tag = self.expect_ident()?;
                if let Some(layout) = self.cx.types.lookup_struct(&tag) {
                    if self.peek().is_punct(P::LBrace) {
                        return Err(self.error_at(self.peek(), &format!("redefinition of struct {}", tag)));
                    }
                    Type::Struct(layout)
                } else if self.consume_punct(P::LBrace) {
                    let layout = self.parse_struct_body(&tag)?;
                    let next = self.peek();
                    if !(next.is_punct(P::Star) || next.kind == K::Identifier) {
                        return Ok(Some(TypeAndName { ty: Type::Struct(layout), name: None }));
                    }
                    Type::Struct(layout)
                } else {
                    Type::Incomplete(tag)
                }
            }
            K::Identifier => match self.cx.types.lookup_alias(t.text) {
                Some(aliased) => {
                    let aliased = aliased.clone();
                    self.pos += 1;
                    aliased
                }
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        while self.consume_punct(P::Star) {
            ty = Type::pointer_to(ty);
        }
        let name = self.expect_ident()?;
        if self.consume_punct(P::LBracket) {
            let n = self.expect_array_len()?;
            self.expect_punct(P::RBracket)?;
            ty = Type::array_of(ty, n);
        } else if self.consume_punct(P::LParen) {
            let params = self.parse_params()?;
            ty = Type::Function(Box::new(FunctionType { ret: ty, params }));
        }
        Ok(Some(TypeAndName { ty, name: Some(name) }))
    }

    /// Members up to and including the closing brace; registers the layout.
    fn parse_struct_body(&mut self, tag: &str) -> Result<std::rc::Rc<StructLayout>> {
        let mut fields = Vec::new();
        while !self.consume_punct(P::RBrace) {
            let t = self.peek();
            let Some(member) = self.parse_type_and_name()? else {
                return Err(self.error_at(t, &format!("expected member declaration in struct {}", tag)));
            };
            let Some(name) = member.name else {
                return Err(self.error_at(t, "struct member needs a name"));
            };
            self.expect_punct(P::Semicolon)?;
            fields.push((name, member.ty));
        }
        let layout = StructLayout::new(tag, fields, &self.cx.types)?;
        self.cx.types.register_struct(layout)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if self.consume_punct(P::RParen) {
            return Ok(params);
        }
        if self.peek().is_keyword(Kw::Void) && self.peek_n(1).is_punct(P::RParen) {
            self.pos += 2;
            return Ok(params);
        }
        loop {
            let t = self.peek();
            let Some(TypeAndName { ty, name: Some(name) }) = self.parse_type_and_name()? else {
                return Err(self.error_at(t, "expected parameter declaration"));
            };
            // array parameters are pointers
            params.push(Param { name, ty: ty.decay() });
            if self.consume_punct(P::Comma) {
                continue;
            }
            self.expect_punct(P::RParen)?;
            return Ok(params);
        }
    }

    pub fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let t = self.peek();
            let K::Punct(p) = t.kind else { break };
            if matches!(p, P::Inc | P::Dec) {
                return Err(self.error_at(t, "postfix increment and decrement are not supported"));
            }
            let Some((lbp, rbp, op)) = infix_binding_power(p) else { break };
            if lbp <= min_bp {
                break;
            }
            self.pos += 1;
            lhs = match op {
                Infix::Binary(op) => {
                    let rhs = self.parse_expr(rbp)?;
                    Expr::binary(op, lhs, rhs)
                }
                Infix::Assign => {
                    let rhs = self.parse_expr(rbp)?;
                    Expr::assign(lhs, rhs)
                }
                Infix::Member { arrow } => {
                    let name = self.expect_ident()?;
                    Expr::new(ExprKind::Member { base: Box::new(lhs), field: Field::Unresolved(name), arrow })
                }
                // a[i] is *(a + i)
                Infix::Index => {
                    let index = self.parse_expr(rbp)?;
                    self.expect_punct(P::RBracket)?;
                    Expr::unary(UnaryOp::Deref, Expr::binary(BinaryOp::Add, lhs, index))
                }
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let t = self.bump();
        match t.kind {
            K::Punct(P::Minus) => Ok(Expr::unary(UnaryOp::Neg, self.parse_expr(PREFIX_BP)?)),
            K::Punct(P::Bang) => Ok(Expr::unary(UnaryOp::LogicalNot, self.parse_expr(PREFIX_BP)?)),
            K::Punct(P::Amp) => Ok(Expr::unary(UnaryOp::AddrOf, self.parse_expr(PREFIX_BP)?)),
            K::Punct(P::Star) => Ok(Expr::unary(UnaryOp::Deref, self.parse_expr(PREFIX_BP)?)),
            K::Punct(p @ (P::Inc | P::Dec)) => {
                let target = self.parse_expr(PREFIX_BP)?;
                if matches!(target.kind, ExprKind::Member { arrow: true, .. }) {
                    return Err(self.error_at(t, "increment of a '->' member is not supported"));
                }
                let op = if p == P::Inc { BinaryOp::Add } else { BinaryOp::Sub };
                // ++x is x = x + 1
                Ok(Expr::assign(target.clone(), Expr::binary(op, target, Expr::num(1))))
            }
            K::Punct(P::LParen) => {
                let e = self.parse_expr(0)?;
                self.expect_punct(P::RParen)?;
                Ok(e)
            }
            K::Int(v) => Ok(Expr::num(v)),
            K::Str => {
                let id = self.cx.strings.add(t.text);
                Ok(Expr::new(ExprKind::Str { id, text: t.text.to_string() }))
            }
            K::Keyword(Kw::Sizeof) => self.parse_sizeof(),
            K::Identifier => {
                let name = t.text.to_string();
                if self.consume_punct(P::LParen) {
                    return self.parse_call(name);
                }
                Ok(self.resolve_identifier(name))
            }
            _ => Err(self.error_at(t, "expected expression")),
        }
    }

    fn resolve_identifier(&self, name: String) -> Expr {
        if let Some(var) = self.cx.locals.find(&name) {
            let ty = var.ty.clone();
            let offset = var.offset;
            return Expr::typed(ExprKind::Local { name, offset }, ty);
        }
        if let Some(var) = self.cx.globals.find(&name) {
            let ty = var.ty.clone();
            return Expr::typed(ExprKind::Global { name }, ty);
        }
        Expr::new(ExprKind::Unresolved(name))
    }

    fn parse_call(&mut self, name: String) -> Result<Expr> {
        let mut args = Vec::new();
        if !self.consume_punct(P::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if self.consume_punct(P::Comma) {
                    continue;
                }
                self.expect_punct(P::RParen)?;
                break;
            }
        }
        Ok(Expr::new(ExprKind::Call { name, args }))
    }

    /// `sizeof(type)` folds to an integer constant.
    fn parse_sizeof(&mut self) -> Result<Expr> {
        self.expect_punct(P::LParen)?;
        let t = self.bump();
        let mut ty = match t.kind {
            K::Keyword(Kw::Int) => Type::Int,
            K::Keyword(Kw::Char) => Type::Char,
            K::Keyword(Kw::Void) => Type::Void,
            K::Keyword(Kw::Struct) => {
                let tag = self.expect_ident()?;
                Type::Incomplete(tag)
            }
            K::Identifier => match self.cx.types.lookup_alias(t.text) {
                Some(aliased) => aliased.clone(),
                None => return Err(self.error_at(t, "expected type name in sizeof")),
            },
            _ => return Err(self.error_at(t, "expected type name in sizeof")),
        };
        while self.consume_punct(P::Star) {
            ty = Type::pointer_to(ty);
        }
        self.expect_punct(P::RParen)?;
        let size = self.cx.types.size_of(&ty).map_err(|e| self.error_at(t, &e.to_string()))?;
        let size = i32::try_from(size).map_err(|_| self.error_at(t, "sizeof result does not fit in int"))?;
        Ok(Expr::num(size))
    }

    pub fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.peek();
        if let Some(decl) = self.parse_type_and_name()? {
            let Some(name) = decl.name else {
                return Err(self.error_at(start, "struct definitions are only supported at file scope"));
            };
            if matches!(decl.ty, Type::Function(_)) {
                return Err(self.error_at(start, &format!("local function declaration of {} is not supported", name)));
            }
            // registered before the initializer is parsed
            let offset = self.cx.locals.add(&name, decl.ty.clone(), &self.cx.types).map_err(|e| self.error_at(start, &e.to_string()))?;
            let init = if self.consume_punct(P::Assign) { Some(self.parse_expr(0)?) } else { None };
            self.expect_punct(P::Semicolon)?;
            return Ok(Stmt::VarDecl { name, offset, ty: decl.ty, init });
        }

        if self.consume_keyword(Kw::Return) {
            if self.consume_punct(P::Semicolon) {
                return Ok(Stmt::Return(None));
            }
            let e = self.parse_expr(0)?;
            self.expect_punct(P::Semicolon)?;
            return Ok(Stmt::Return(Some(e)));
        }
        if self.consume_keyword(Kw::Break) {
            self.expect_punct(P::Semicolon)?;
            return Ok(Stmt::Break);
        }
        if self.consume_keyword(Kw::Continue) {
            self.expect_punct(P::Semicolon)?;
            return Ok(Stmt::Continue);
        }
        if self.consume_keyword(Kw::If) {
            self.expect_punct(P::LParen)?;
            let cond = self.parse_expr(0)?;
            self.expect_punct(P::RParen)?;
            let then_branch = Box::new(self.parse_stmt()?);
            let else_branch = if self.consume_keyword(Kw::Else) { Some(Box::new(self.parse_stmt()?)) } else { None };
            return Ok(Stmt::If { cond, then_branch, else_branch });
        }
        if self.consume_keyword(Kw::While) {
            self.expect_punct(P::LParen)?;
            let cond = self.parse_expr(0)?;
            self.expect_punct(P::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::While { cond, body });
        }
        if self.consume_keyword(Kw::For) {
            self.expect_punct(P::LParen)?;
            let init = self.parse_optional_expr(P::Semicolon)?;
            let cond = self.parse_optional_expr(P::Semicolon)?;
            let step = self.parse_optional_expr(P::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::For { init, cond, step, body });
        }
        if self.consume_punct(P::LBrace) {
            let mut stmts = Vec::new();
            while !self.consume_punct(P::RBrace) {
                if self.at_eof() {
                    return Err(self.error_at(self.peek(), "expected '}'"));
                }
                stmts.push(self.parse_stmt()?);
            }
            return Ok(Stmt::Block(stmts));
        }

        let e = self.parse_expr(0)?;
        self.expect_punct(P::Semicolon)?;
        Ok(Stmt::Expr(e))
    }

    fn parse_optional_expr(&mut self, terminator: P) -> Result<Option<Expr>> {
        if self.consume_punct(terminator) {
            return Ok(None);
        }
        let e = self.parse_expr(0)?;
        self.expect_punct(terminator)?;
        Ok(Some(e))
    }

    /// Parse one top-level construct. Struct definitions, struct bodies
    /// completing a forward-declared tag, and function prototypes register
    /// what they declare and yield `None`.
    pub fn parse_declaration(&mut self, annotator: &mut dyn Annotate) -> Result<Option<Declaration>> {
        let start = self.peek();
        if self.consume_keyword(Kw::Typedef) {
            let t = self.peek();
            let Some(TypeAndName { ty, name: Some(name) }) = self.parse_type_and_name()? else {
                return Err(self.error_at(t, "expected type and name after typedef"));
            };
            self.expect_punct(P::Semicolon)?;
            self.cx.types.register_alias(&name, ty.clone());
            return Ok(Some(Declaration::Typedef { name, ty }));
        }

        let Some(TypeAndName { ty, name }) = self.parse_type_and_name()? else {
            return Err(self.error_at(start, "expected declaration"));
        };
        let Some(name) = name else {
            self.expect_punct(P::Semicolon)?;
            return Ok(None);
        };

        if self.consume_punct(P::Semicolon) {
            if matches!(ty, Type::Function(_)) {
                return Ok(None);
            }
            return self.add_global(start, name, ty, None).map(Some);
        }

        if self.consume_punct(P::Assign) {
            let t = self.bump();
            let init = match t.kind {
                K::Int(v) => GlobalInit::Int(v),
                K::Punct(P::Minus) => match self.bump().kind {
                    K::Int(v) => GlobalInit::Int(v.wrapping_neg()),
                    _ => return Err(self.error_at(t, "expected integer after '-' in global initializer")),
                },
                K::Str => {
                    let id = self.cx.strings.add(t.text);
                    GlobalInit::Str { id, text: t.text.to_string() }
                }
                _ => return Err(self.error_at(t, "global initializer must be an integer or string literal")),
            };
            self.expect_punct(P::Semicolon)?;
            return self.add_global(start, name, ty, Some(init)).map(Some);
        }

        if self.consume_punct(P::LBrace) {
            return match ty {
                Type::Incomplete(tag) => {
                    self.parse_struct_body(&tag)?;
                    Ok(None)
                }
                Type::Function(fty) => {
                    let func = self.parse_function_body(name, *fty, annotator)?;
                    Ok(Some(Declaration::Function(func)))
                }
                _ => return Err(self.error_at(start, &format!("'{}' is not a function", name))),
            };
        }

        Err(self.error_at(self.peek(), &format!("expected ';', '=' or '{{' after {}", name)))
    }

    fn add_global(&mut self, at: Token<'src>, name: String, ty: Type, init: Option<GlobalInit>) -> Result<Declaration> {
        let var = GlobalVariable { name, ty, init };
        self.cx.globals.add(var.clone(), &self.cx.types).map_err(|e| self.error_at(at, &e.to_string()))?;
        Ok(Declaration::Global(var))
    }

    fn parse_function_body(&mut self, name: String, ty: FunctionType, annotator: &mut dyn Annotate) -> Result<Function> {
        self.cx.locals = Locals::default();
        for p in &ty.params {
            self.cx.locals.add(&p.name, p.ty.clone(), &self.cx.types)?;
        }
        let mut body = Vec::new();
        while !self.consume_punct(P::RBrace) {
            if self.at_eof() {
                return Err(self.error_at(self.peek(), &format!("expected '}}' to close {}", name)));
            }
            let mut stmt = self.parse_stmt()?;
            annotator.annotate(&mut stmt, &self.cx.types)?;
            body.push(stmt);
        }
        if !matches!(body.last(), Some(Stmt::Return(_))) {
            body.push(Stmt::Return(None));
        }
        let locals = std::mem::take(&mut self.cx.locals);
        Ok(Function { name, ty, body, locals })
    }

    /// Next declaration that produces output, or `None` at end of input.
    pub fn next_declaration(&mut self, annotator: &mut dyn Annotate) -> Result<Option<Declaration>> {
        while !self.at_eof() {
            if let Some(decl) = self.parse_declaration(annotator).context("failed to parse declaration")? {
                return Ok(Some(decl));
            }
        }
        Ok(None)
    }
}
