#![forbid(unsafe_code)]

use std::mem;

use keel_ast::{
    join, span_between, AssignStmt, BinOp, Block, CallExpr, CallStmt, ClassDef, CtorBody, CtorDecl,
    CtorKind, DeferStmt, Expr, ExprKind, FieldDef, ForStmt, Function, Ident, IfStmt, NodeId, Program,
    ReturnStmt, Span, Stmt, TypeModifier, TypeName, TypeRef, VarDecl, WhileStmt,
};
use keel_diagnostics::codes;
use keel_lex::{Token, TokenKind};

use crate::error::ParseError;

/// Blocks and parenthesized expressions nested deeper than this abort parsing.
pub const MAX_DEPTH: usize = 256;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    next_id: u32,
    depth: usize,
    errors: Vec<ParseError>,
}

enum Member {
    Field(FieldDef),
    Ctor(CtorDecl),
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            idx: 0,
            next_id: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    /// Parse a whole program, recovering from errors.
    ///
    /// Recovery: a failed statement skips to the next `;` (or to the `}` that
    /// closes the current block) and parsing resumes; a failed top-level item
    /// skips to the next `fn` or `class`. A nesting overflow is fatal and ends
    /// parsing immediately.
    pub fn parse_program_with_recovery(&mut self) -> (Program, Vec<ParseError>) {
        let mut functions = Vec::new();
        let mut classes = Vec::new();

        while !self.at_end() {
            let start = self.idx;
            let result = match self.peek_kind() {
                Some(TokenKind::KwFn) => self.parse_function().map(|f| functions.push(f)),
                Some(TokenKind::KwClass) => self.parse_class().map(|c| classes.push(c)),
                _ => Err(ParseError::new(
                    codes::PARSE_EXPECTED_ITEM,
                    format!("expected `fn` or `class`, found {}", self.found()),
                    self.peek_span(),
                )),
            };
            if let Err(err) = result {
                let fatal = err.is_fatal();
                self.errors.push(err);
                if fatal {
                    break;
                }
                self.recover_to_item_boundary(start);
            }
        }

        let end = self.tokens.last().map(|t| t.span.offset() + t.span.len()).unwrap_or(0);
        let program = Program {
            span: span_between(0, end),
            functions,
            classes,
        };
        log::debug!(
            "parsed {} function(s), {} class(es), {} error(s)",
            program.functions.len(),
            program.classes.len(),
            self.errors.len()
        );
        (program, mem::take(&mut self.errors))
    }

    fn recover_to_item_boundary(&mut self, start: usize) {
        if self.idx == start {
            self.next();
        }
        while !self.at_end() && !self.at(TokenKind::KwFn) && !self.at(TokenKind::KwClass) {
            self.next();
        }
    }

    /// Skip to the next statement terminator: a `;` or a balanced `}` is
    /// consumed; the `}` closing the current block is left in place.
    fn recover_to_stmt_boundary(&mut self) {
        let mut braces = 0usize;
        while !self.at_end() {
            match self.peek_kind() {
                Some(TokenKind::Semi) if braces == 0 => {
                    self.next();
                    return;
                }
                Some(TokenKind::LBrace) => braces += 1,
                Some(TokenKind::RBrace) => {
                    if braces == 0 {
                        return;
                    }
                    braces -= 1;
                    if braces == 0 {
                        self.next();
                        return;
                    }
                }
                _ => {}
            }
            self.next();
        }
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let kw = self.expect(TokenKind::KwFn)?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        if !self.at(TokenKind::RParen) {
            return Err(self
                .expected(&TokenKind::RParen)
                .with_help("functions take no parameters"));
        }
        self.next();
        let body = self.parse_block()?;
        Ok(Function {
            id,
            span: join(kw.span, body.span),
            name,
            body,
        })
    }

    fn parse_class(&mut self) -> Result<ClassDef, ParseError> {
        let kw = self.expect(TokenKind::KwClass)?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut ctors = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.expected(&TokenKind::RBrace));
            }
            match self.parse_member(&name) {
                Ok(Member::Field(f)) => fields.push(f),
                Ok(Member::Ctor(c)) => ctors.push(c),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_stmt_boundary();
                }
            }
        }
        let rb = self.expect(TokenKind::RBrace)?;
        let mut end = rb.span;
        if self.at(TokenKind::Semi) {
            end = self.peek_span();
            self.next();
        }

        Ok(ClassDef {
            id,
            span: join(kw.span, end),
            name,
            fields,
            ctors,
        })
    }

    fn parse_member(&mut self, class: &Ident) -> Result<Member, ParseError> {
        let start = self.peek_span();

        if self.at(TokenKind::Tilde) {
            self.next();
            let name = self.expect_ident()?;
            if name.node != class.node {
                return Err(ParseError::new(
                    codes::PARSE_BAD_CTOR,
                    format!("destructor `~{}` does not match class `{}`", name.node, class.node),
                    name.span,
                ));
            }
            self.expect(TokenKind::LParen)?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_ctor_body()?;
            return Ok(Member::Ctor(CtorDecl {
                span: join(start, self.prev_span()),
                kind: CtorKind::Destructor,
                explicit: false,
                body,
            }));
        }

        let explicit = self.at(TokenKind::KwExplicit);
        if explicit {
            self.next();
        }

        let names_class = matches!(self.peek_kind(), Some(TokenKind::Ident(n)) if *n == class.node)
            && matches!(self.peek_kind_n(1), Some(TokenKind::LParen));
        if names_class {
            self.next();
            self.next();
            let kind = self.parse_ctor_params(class)?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_ctor_body()?;
            return Ok(Member::Ctor(CtorDecl {
                span: join(start, self.prev_span()),
                kind,
                explicit,
                body,
            }));
        }
        if explicit {
            return Err(ParseError::new(
                codes::PARSE_BAD_CTOR,
                format!("`explicit` must be followed by a constructor of `{}`", class.node),
                self.peek_span(),
            ));
        }

        let ty = self.parse_type_ref()?;
        let name = self.expect_ident()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(Member::Field(FieldDef {
            span: join(ty.span, semi.span),
            ty,
            name,
        }))
    }

    fn parse_ctor_params(&mut self, class: &Ident) -> Result<CtorKind, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::RParen) => Ok(CtorKind::Default),
            Some(TokenKind::KwConst) => {
                self.next();
                self.expect_class_name(class)?;
                self.expect(TokenKind::Amp)?;
                self.skip_optional_ident();
                Ok(CtorKind::Copy)
            }
            Some(TokenKind::Ident(_)) => {
                self.expect_class_name(class)?;
                self.expect(TokenKind::AndAnd)?;
                self.skip_optional_ident();
                Ok(CtorKind::Move)
            }
            _ => Err(ParseError::new(
                codes::PARSE_BAD_CTOR,
                format!("unsupported constructor parameters, found {}", self.found()),
                self.peek_span(),
            )
            .with_help(format!(
                "use `()`, `(const {0}& other)` or `({0}&& other)`",
                class.node
            ))),
        }
    }

    fn expect_class_name(&mut self, class: &Ident) -> Result<(), ParseError> {
        let name = self.expect_ident()?;
        if name.node != class.node {
            return Err(ParseError::new(
                codes::PARSE_BAD_CTOR,
                format!("constructor parameter must have type `{}`, found `{}`", class.node, name.node),
                name.span,
            ));
        }
        Ok(())
    }

    fn skip_optional_ident(&mut self) {
        if matches!(self.peek_kind(), Some(TokenKind::Ident(_))) {
            self.next();
        }
    }

    fn parse_ctor_body(&mut self) -> Result<CtorBody, ParseError> {
        if self.at(TokenKind::LBrace) {
            return Ok(CtorBody::Body(self.parse_block()?));
        }
        if !self.at(TokenKind::Eq) {
            return Err(ParseError::new(
                codes::PARSE_BAD_CTOR,
                format!("expected `= default;`, `= delete;` or a body, found {}", self.found()),
                self.peek_span(),
            ));
        }
        self.next();
        let body = match self.peek_kind() {
            Some(TokenKind::KwDefault) => CtorBody::Defaulted,
            Some(TokenKind::Ident(n)) if n == "delete" => CtorBody::Deleted,
            _ => {
                return Err(ParseError::new(
                    codes::PARSE_BAD_CTOR,
                    format!("expected `default` or `delete`, found {}", self.found()),
                    self.peek_span(),
                ));
            }
        };
        self.next();
        self.expect(TokenKind::Semi)?;
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.enter_nesting()?;
        let result = self.parse_block_inner();
        self.depth -= 1;
        result
    }

    fn parse_block_inner(&mut self) -> Result<Block, ParseError> {
        let lb = self.expect(TokenKind::LBrace)?;
        let id = self.fresh_id();
        let mut stmts = Vec::new();

        loop {
            if self.at(TokenKind::RBrace) {
                let rb = self.expect(TokenKind::RBrace)?;
                return Ok(Block {
                    id,
                    span: join(lb.span, rb.span),
                    stmts,
                });
            }
            if self.at_end() {
                let err = self
                    .expected(&TokenKind::RBrace)
                    .with_help("this block is never closed");
                self.errors.push(err);
                return Ok(Block {
                    id,
                    span: join(lb.span, self.prev_span()),
                    stmts,
                });
            }

            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_stmt_boundary();
                }
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::KwIf) => Ok(Stmt::If(self.parse_if_stmt()?)),
            Some(TokenKind::KwWhile) => Ok(Stmt::While(self.parse_while_stmt()?)),
            Some(TokenKind::KwFor) => Ok(Stmt::For(self.parse_for_stmt()?)),
            Some(TokenKind::KwReturn) => Ok(Stmt::Return(self.parse_return_stmt()?)),
            Some(TokenKind::KwDefer) => Ok(Stmt::Defer(self.parse_defer_stmt()?)),
            Some(
                TokenKind::KwConst
                | TokenKind::KwInt
                | TokenKind::KwBool
                | TokenKind::KwVoid
                | TokenKind::KwAuto,
            ) => Ok(Stmt::VarDecl(self.parse_var_decl()?)),
            Some(TokenKind::Ident(name)) if name == "break" || name == "continue" => {
                Err(ParseError::new(
                    codes::PARSE_UNSUPPORTED_JUMP,
                    format!("`{name}` is not supported"),
                    self.peek_span(),
                )
                .with_help("express the loop exit through its condition"))
            }
            Some(TokenKind::Ident(_)) => {
                if self.at_named_decl() {
                    Ok(Stmt::VarDecl(self.parse_var_decl()?))
                } else if matches!(self.peek_kind_n(1), Some(TokenKind::LParen)) {
                    let call = self.parse_call_expr()?;
                    let semi = self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Call(CallStmt {
                        span: join(call.span, semi.span),
                        call,
                    }))
                } else {
                    Ok(Stmt::Assign(self.parse_assign_stmt()?))
                }
            }
            Some(
                TokenKind::Int(_)
                | TokenKind::Str(_)
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::KwRange
                | TokenKind::LParen,
            ) => Ok(Stmt::Assign(self.parse_assign_stmt()?)),
            _ => Err(ParseError::new(
                codes::PARSE_EXPECTED_STMT,
                format!("expected statement, found {}", self.found()),
                self.peek_span(),
            )),
        }
    }

    /// `Name (*|&)* ident` starts a declaration with a class type.
    fn at_named_decl(&self) -> bool {
        let mut n = 1;
        while matches!(self.peek_kind_n(n), Some(TokenKind::Star | TokenKind::Amp)) {
            n += 1;
        }
        matches!(self.peek_kind_n(n), Some(TokenKind::Ident(_)))
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let ty = self.parse_type_ref()?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        let init = if self.at(TokenKind::Eq) {
            self.next();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let semi = self.expect(TokenKind::Semi)?;
        Ok(VarDecl {
            id,
            span: join(ty.span, semi.span),
            ty,
            name,
            init,
        })
    }

    fn parse_assign_stmt(&mut self) -> Result<AssignStmt, ParseError> {
        let target = self.parse_expr()?;
        self.expect(TokenKind::Eq)?;
        let expr = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(AssignStmt {
            span: join(target.span, semi.span),
            target,
            expr,
        })
    }

    fn parse_if_stmt(&mut self) -> Result<IfStmt, ParseError> {
        let kw = self.expect(TokenKind::KwIf)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_block()?;
        let else_block = if self.at(TokenKind::KwElse) {
            self.next();
            Some(self.parse_block()?)
        } else {
            None
        };
        let end = else_block.as_ref().map(|b| b.span).unwrap_or(then_block.span);
        Ok(IfStmt {
            span: join(kw.span, end),
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_while_stmt(&mut self) -> Result<WhileStmt, ParseError> {
        let kw = self.expect(TokenKind::KwWhile)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(WhileStmt {
            span: join(kw.span, body.span),
            cond,
            body,
        })
    }

    fn parse_for_stmt(&mut self) -> Result<ForStmt, ParseError> {
        let kw = self.expect(TokenKind::KwFor)?;
        let id = self.fresh_id();
        self.expect(TokenKind::LParen)?;
        let var = self.expect_ident()?;
        self.expect(TokenKind::KwIn)?;
        let iter = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(ForStmt {
            id,
            span: join(kw.span, body.span),
            var,
            iter,
            body,
        })
    }

    fn parse_return_stmt(&mut self) -> Result<ReturnStmt, ParseError> {
        let kw = self.expect(TokenKind::KwReturn)?;
        let value = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let semi = self.expect(TokenKind::Semi)?;
        Ok(ReturnStmt {
            span: join(kw.span, semi.span),
            value,
        })
    }

    fn parse_defer_stmt(&mut self) -> Result<DeferStmt, ParseError> {
        let kw = self.expect(TokenKind::KwDefer)?;
        let call = self.parse_call_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(DeferStmt {
            span: join(kw.span, semi.span),
            call,
        })
    }

    fn parse_call_expr(&mut self) -> Result<CallExpr, ParseError> {
        let callee = self.expect_ident()?;
        let id = self.fresh_id();
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.at(TokenKind::Comma) {
                    self.next();
                    continue;
                }
                break;
            }
        }
        let rp = self.expect(TokenKind::RParen)?;
        Ok(CallExpr {
            id,
            span: join(callee.span, rp.span),
            callee,
            args,
        })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let start = self.peek_span();
        let is_const = self.at(TokenKind::KwConst);
        if is_const {
            self.next();
        }

        let base = match self.peek_kind() {
            Some(TokenKind::KwInt) => TypeName::Int,
            Some(TokenKind::KwBool) => TypeName::Bool,
            Some(TokenKind::KwVoid) => TypeName::Void,
            Some(TokenKind::KwAuto) => TypeName::Auto,
            Some(TokenKind::Ident(_)) => TypeName::Named(self.expect_ident()?),
            _ => {
                return Err(ParseError::new(
                    codes::PARSE_EXPECTED_TOKEN,
                    format!("expected type, found {}", self.found()),
                    self.peek_span(),
                ));
            }
        };
        if !matches!(base, TypeName::Named(_)) {
            self.next();
        }

        let mut modifiers = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Star) => modifiers.push(TypeModifier::Pointer),
                Some(TokenKind::Amp) => modifiers.push(TypeModifier::Reference),
                _ => break,
            }
            self.next();
        }

        Ok(TypeRef {
            span: join(start, self.prev_span()),
            is_const,
            base,
            modifiers,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter_nesting()?;
        let result = self.parse_and_expr();
        self.depth -= 1;
        result
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_cmp_expr()?;
        while self.at(TokenKind::AndAnd) {
            let op_tok = self.expect(TokenKind::AndAnd)?;
            let right = self.parse_cmp_expr()?;
            left = self.binary(left, BinOp::And, op_tok.span, right);
        }
        Ok(left)
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_add_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::Ne) => BinOp::Ne,
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Le) => BinOp::Le,
                Some(TokenKind::Ge) => BinOp::Ge,
                _ => break,
            };
            let op_span = self.peek_span();
            self.next();
            let right = self.parse_add_expr()?;
            left = self.binary(left, op, op_span, right);
        }
        Ok(left)
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            let op_span = self.peek_span();
            self.next();
            let right = self.parse_mul_expr()?;
            left = self.binary(left, op, op_span, right);
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_postfix_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Rem,
                _ => break,
            };
            let op_span = self.peek_span();
            self.next();
            let right = self.parse_postfix_expr()?;
            left = self.binary(left, op, op_span, right);
        }
        Ok(left)
    }

    fn binary(&mut self, left: Expr, op: BinOp, op_span: Span, right: Expr) -> Expr {
        Expr {
            id: self.fresh_id(),
            span: join(left.span, right.span),
            kind: ExprKind::Binary {
                left: Box::new(left),
                op,
                op_span,
                right: Box::new(right),
            },
        }
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        while self.at(TokenKind::Dot) {
            self.next();
            let field = self.expect_ident()?;
            expr = Expr {
                id: self.fresh_id(),
                span: join(expr.span, field.span),
                kind: ExprKind::Field {
                    base: Box::new(expr),
                    field,
                },
            };
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.peek_span();
        let kind = match self.peek_kind() {
            Some(TokenKind::Int(n)) => ExprKind::IntLit(*n),
            Some(TokenKind::KwTrue) => ExprKind::BoolLit(true),
            Some(TokenKind::KwFalse) => ExprKind::BoolLit(false),
            Some(TokenKind::Str(s)) => ExprKind::StringLit(s.clone()),
            Some(TokenKind::Ident(_)) => ExprKind::Var(self.expect_ident()?),
            Some(TokenKind::KwRange) => {
                self.next();
                self.expect(TokenKind::LParen)?;
                let bound = self.parse_expr()?;
                let rp = self.expect(TokenKind::RParen)?;
                return Ok(Expr {
                    id: self.fresh_id(),
                    span: join(span, rp.span),
                    kind: ExprKind::Range(Box::new(bound)),
                });
            }
            Some(TokenKind::LParen) => {
                self.next();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => {
                return Err(ParseError::new(
                    codes::PARSE_EXPECTED_TOKEN,
                    format!("expected expression, found {}", self.found()),
                    span,
                ));
            }
        };
        if !matches!(kind, ExprKind::Var(_)) {
            self.next();
        }
        Ok(Expr {
            id: self.fresh_id(),
            span,
            kind,
        })
    }

    fn enter_nesting(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                codes::PARSE_TOO_DEEP,
                format!("nesting exceeds {MAX_DEPTH} levels"),
                self.peek_span(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name)) => {
                let ident = Ident::new(self.peek_span(), name.clone());
                self.next();
                Ok(ident)
            }
            _ => Err(self.expected(&TokenKind::Ident(String::new()))),
        }
    }

    /// Consume the next token if it has the same kind as `expected`; leave the
    /// stream untouched otherwise so recovery can see the offending token.
    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        if !self.at(expected.clone()) {
            return Err(self.expected(&expected));
        }
        self.next().ok_or_else(|| self.expected(&expected))
    }

    fn expected(&self, expected: &TokenKind) -> ParseError {
        ParseError::new(
            codes::PARSE_EXPECTED_TOKEN,
            format!("expected {}, found {}", expected.describe(), self.found()),
            self.peek_span(),
        )
    }

    fn found(&self) -> String {
        match self.tokens.get(self.idx) {
            Some(t) if t.kind == TokenKind::Eof => "end of input".to_string(),
            Some(t) => format!("`{}`", t.lexeme),
            None => "end of input".to_string(),
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn at_end(&self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::Eof))
    }

    /// The end-of-stream token is never consumed.
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        if tok.kind != TokenKind::Eof {
            self.idx += 1;
        }
        Some(tok)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| span_between(0, 0))
    }

    fn prev_span(&self) -> Span {
        self.idx
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_else(|| self.peek_span())
    }
}
