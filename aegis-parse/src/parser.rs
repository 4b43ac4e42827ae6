#![forbid(unsafe_code)]

use std::mem;

use aegis_ast::{
    join, span_between, AssignStmt, BinOp, Block, ConstDecl, EnumDecl, EnumVariant, Expr,
    ExprKind, FieldDecl, FnDecl, ForIter, ForStmt, Ident, IfStmt, Item, LetStmt, ModuleDecl,
    NodeId, Param, Program, ReturnStmt, Span, Stmt, StructDecl, TypeRef, TypeRefKind, UnaryOp,
    WhileStmt,
};
use aegis_lex::{Token, TokenKind};

use crate::error::ParseError;

/// Default nesting bound for expressions, types and blocks.
pub const DEFAULT_MAX_DEPTH: usize = 96;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    next_id: u32,
    depth: usize,
    max_depth: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self::with_max_depth(tokens, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(tokens: &'a [Token], max_depth: usize) -> Self {
        Self {
            tokens,
            idx: 0,
            next_id: 0,
            depth: 0,
            max_depth,
            errors: Vec::new(),
        }
    }

    /// Parses a whole file. Errors are recorded and parsing resumes at the
    /// next statement or declaration boundary, so the returned program is
    /// best-effort whenever the error list is non-empty.
    pub fn parse_program(&mut self) -> (Program, Vec<ParseError>) {
        let mut modules = Vec::new();

        loop {
            self.skip_newlines();
            if self.at(TokenKind::Eof) {
                break;
            }
            let start = self.idx;
            match self.parse_module() {
                Ok(m) => modules.push(m),
                Err(err) => {
                    self.errors.push(err);
                    if self.idx == start {
                        self.next();
                    }
                    self.recover_to_module();
                }
            }
        }

        (Program { modules }, mem::take(&mut self.errors))
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        self.skip_newlines();
        if !self.at(TokenKind::Eof) {
            return Err(self.unexpected("end of input"));
        }
        Ok(expr)
    }

    pub fn parse_type_eof(&mut self) -> Result<TypeRef, ParseError> {
        let ty = self.parse_type()?;
        self.skip_newlines();
        if !self.at(TokenKind::Eof) {
            return Err(self.unexpected("end of input"));
        }
        Ok(ty)
    }

    fn parse_module(&mut self) -> Result<ModuleDecl, ParseError> {
        if !self.at(TokenKind::KwModule) {
            return Err(self.unexpected("`module` declaration"));
        }
        let start = self.expect(TokenKind::KwModule)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.expect(TokenKind::Indent)?;

        let mut members = Vec::new();
        let mut end = name.span;
        loop {
            self.skip_newlines();
            if self.at(TokenKind::Dedent) {
                if let Some(tok) = self.next() {
                    end = tok.span;
                }
                break;
            }
            if self.at(TokenKind::Eof) {
                break;
            }
            let before = self.idx;
            match self.parse_member() {
                Ok(item) => {
                    end = item.span();
                    members.push(item);
                }
                Err(err) => {
                    self.errors.push(err);
                    if self.idx == before {
                        self.next();
                    }
                    self.recover_to_member();
                }
            }
        }

        Ok(ModuleDecl {
            span: join(start.span, end),
            name,
            members,
        })
    }

    fn parse_member(&mut self) -> Result<Item, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwStruct) => Ok(Item::Struct(self.parse_struct()?)),
            Some(TokenKind::KwEnum) => Ok(Item::Enum(self.parse_enum()?)),
            Some(TokenKind::KwConst) => Ok(Item::Const(self.parse_const()?)),
            Some(TokenKind::KwFn) | Some(TokenKind::KwAsync) => Ok(Item::Fn(self.parse_fn()?)),
            Some(TokenKind::KwModule) => Err(ParseError::new(
                "modules cannot be nested",
                self.peek_span_or_eof(),
            )),
            _ => Err(self.unexpected("`struct`, `enum`, `const` or `fn`")),
        }
    }

    fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        let start = self.expect(TokenKind::KwStruct)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let (fields, end) = self.parse_decl_body(|p| {
            let name = p.expect_ident()?;
            p.expect(TokenKind::Colon)?;
            let ty = p.parse_type()?;
            p.expect_stmt_terminator()?;
            Ok(FieldDecl {
                span: join(name.span, ty.span),
                name,
                ty,
            })
        })?;
        Ok(StructDecl {
            span: join(start.span, end),
            name,
            fields,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, ParseError> {
        let start = self.expect(TokenKind::KwEnum)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let (variants, end) = self.parse_decl_body(|p| {
            let name = p.expect_ident()?;
            let mut span = name.span;
            let mut payload = Vec::new();
            if p.at(TokenKind::LParen) {
                p.next();
                if !p.at(TokenKind::RParen) {
                    loop {
                        payload.push(p.parse_type()?);
                        if !p.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let rp = p.expect(TokenKind::RParen)?;
                span = join(span, rp.span);
            }
            p.expect_stmt_terminator()?;
            Ok(EnumVariant {
                span,
                name,
                payload,
            })
        })?;
        Ok(EnumDecl {
            span: join(start.span, end),
            name,
            variants,
        })
    }

    /// `Newline Indent entry+ Dedent` for struct fields and enum variants.
    fn parse_decl_body<T>(
        &mut self,
        mut entry: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<(Vec<T>, Span), ParseError> {
        self.expect(TokenKind::Newline)?;
        let indent = self.expect(TokenKind::Indent)?;
        let mut out = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(TokenKind::Dedent) || self.at(TokenKind::Eof) {
                let end = self.peek_span_or_eof();
                self.eat(TokenKind::Dedent);
                if out.is_empty() {
                    return Err(ParseError::new("declaration body is empty", indent.span));
                }
                return Ok((out, end));
            }
            let before = self.idx;
            match entry(self) {
                Ok(item) => out.push(item),
                Err(err) => {
                    self.errors.push(err);
                    if self.idx == before {
                        self.next();
                    }
                    self.recover_to_stmt_boundary();
                }
            }
        }
    }

    fn parse_const(&mut self) -> Result<ConstDecl, ParseError> {
        let start = self.expect(TokenKind::KwConst)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        self.expect_stmt_terminator()?;
        Ok(ConstDecl {
            span: join(start.span, value.span),
            name,
            ty,
            value,
        })
    }

    fn parse_fn(&mut self) -> Result<FnDecl, ParseError> {
        let start = self.peek_span_or_eof();
        let is_async = self.eat(TokenKind::KwAsync);
        self.expect(TokenKind::KwFn)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let ret = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(FnDecl {
            span: join(start, body.span),
            name,
            is_async,
            params,
            ret,
            body,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if self.at(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                span: join(name.span, ty.span),
                name,
                ty,
            });
            if !self.eat(TokenKind::Comma) || self.at(TokenKind::RParen) {
                break;
            }
        }
        Ok(params)
    }

    /// After `:`, a block is `Newline Indent stmt* Dedent`.
    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.nested(|p| {
            p.expect(TokenKind::Newline)?;
            let indent = p.expect(TokenKind::Indent)?;

            let mut stmts = Vec::new();
            loop {
                p.skip_newlines();
                if p.at(TokenKind::Dedent) {
                    let end = p.next().map(|t| t.span).unwrap_or(indent.span);
                    return Ok(Block {
                        span: join(indent.span, end),
                        stmts,
                    });
                }
                if p.at(TokenKind::Eof) {
                    return Err(ParseError::new(
                        "unterminated block; expected end of block",
                        indent.span,
                    ));
                }

                let before = p.idx;
                match p.parse_stmt() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(err) => {
                        p.errors.push(err);
                        if p.idx == before {
                            p.next();
                        }
                        p.recover_to_stmt_boundary();
                    }
                }
            }
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwLet) => Ok(Stmt::Let(self.parse_let()?)),
            Some(TokenKind::KwReturn) => Ok(Stmt::Return(self.parse_return()?)),
            Some(TokenKind::KwIf) => Ok(Stmt::If(self.parse_if()?)),
            Some(TokenKind::KwFor) => Ok(Stmt::For(self.parse_for()?)),
            Some(TokenKind::KwWhile) => Ok(Stmt::While(self.parse_while()?)),
            Some(TokenKind::KwElif) | Some(TokenKind::KwElse) => Err(ParseError::new(
                "`elif`/`else` without a preceding `if`",
                self.peek_span_or_eof(),
            )),
            Some(k) if k.starts_declaration() => Err(ParseError::new(
                "declarations are only allowed at module level",
                self.peek_span_or_eof(),
            )),
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(TokenKind::Eq) {
                    if expr.place_root().is_none() {
                        return Err(ParseError::new(
                            "invalid assignment target; expected a variable, field or index",
                            expr.span,
                        ));
                    }
                    let value = self.parse_expr()?;
                    self.expect_stmt_terminator()?;
                    return Ok(Stmt::Assign(AssignStmt {
                        span: join(expr.span, value.span),
                        target: expr,
                        value,
                    }));
                }
                self.expect_stmt_terminator()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_let(&mut self) -> Result<LetStmt, ParseError> {
        let start = self.expect(TokenKind::KwLet)?;
        let mutable = self.eat(TokenKind::KwMut);
        let name = self.expect_ident()?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        self.expect_stmt_terminator()?;
        Ok(LetStmt {
            span: join(start.span, value.span),
            name,
            mutable,
            ty,
            value,
        })
    }

    fn parse_return(&mut self) -> Result<ReturnStmt, ParseError> {
        let start = self.expect(TokenKind::KwReturn)?;
        let value = if self.at(TokenKind::Newline)
            || self.at(TokenKind::Dedent)
            || self.at(TokenKind::Eof)
        {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_stmt_terminator()?;
        let span = value
            .as_ref()
            .map(|v| join(start.span, v.span))
            .unwrap_or(start.span);
        Ok(ReturnStmt { span, value })
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        let start = self.expect(TokenKind::KwIf)?;
        self.parse_if_tail(start.span)
    }

    /// Everything after `if`/`elif`. An `elif` becomes an else block holding
    /// a single nested `if`.
    fn parse_if_tail(&mut self, start: Span) -> Result<IfStmt, ParseError> {
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let then_block = self.parse_block()?;

        self.skip_newlines();
        let else_block = if self.at(TokenKind::KwElif) {
            let tok = self.expect(TokenKind::KwElif)?;
            let nested = self.nested(|p| p.parse_if_tail(tok.span))?;
            Some(Block {
                span: nested.span,
                stmts: vec![Stmt::If(nested)],
            })
        } else if self.eat(TokenKind::KwElse) {
            self.expect(TokenKind::Colon)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        let end = else_block
            .as_ref()
            .map(|b| b.span)
            .unwrap_or(then_block.span);
        Ok(IfStmt {
            span: join(start, end),
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<ForStmt, ParseError> {
        let start = self.expect(TokenKind::KwFor)?;
        let var = self.expect_ident()?;
        self.expect(TokenKind::KwIn)?;
        let first = self.parse_expr()?;
        let iter = if self.eat(TokenKind::DotDot) {
            let end = self.parse_expr()?;
            ForIter::Range { start: first, end }
        } else {
            ForIter::Each(first)
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(ForStmt {
            span: join(start.span, body.span),
            var,
            iter,
            body,
        })
    }

    fn parse_while(&mut self) -> Result<WhileStmt, ParseError> {
        let start = self.expect(TokenKind::KwWhile)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(WhileStmt {
            span: join(start.span, body.span),
            cond,
            body,
        })
    }

    fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        self.nested(|p| {
            if p.at(TokenKind::LBracket) {
                let lb = p.expect(TokenKind::LBracket)?;
                let elem = p.parse_type()?;
                let rb = p.expect(TokenKind::RBracket)?;
                return Ok(TypeRef {
                    span: join(lb.span, rb.span),
                    kind: TypeRefKind::Array(Box::new(elem)),
                });
            }

            if p.at(TokenKind::KwFn) {
                let kw = p.expect(TokenKind::KwFn)?;
                p.expect(TokenKind::LParen)?;
                let mut params = Vec::new();
                if !p.at(TokenKind::RParen) {
                    loop {
                        params.push(p.parse_type()?);
                        if !p.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let rp = p.expect(TokenKind::RParen)?;
                let mut span = join(kw.span, rp.span);
                let ret = if p.eat(TokenKind::Arrow) {
                    let r = p.parse_type()?;
                    span = join(span, r.span);
                    Some(Box::new(r))
                } else {
                    None
                };
                return Ok(TypeRef {
                    span,
                    kind: TypeRefKind::Function { params, ret },
                });
            }

            let first = p.expect_ident()?;
            let mut span = first.span;
            let mut path = vec![first];
            while p.eat(TokenKind::Dot) {
                let seg = p.expect_ident()?;
                span = join(span, seg.span);
                path.push(seg);
            }
            let mut args = Vec::new();
            if p.eat(TokenKind::Lt) {
                loop {
                    args.push(p.parse_type()?);
                    if !p.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let gt = p.expect(TokenKind::Gt)?;
                span = join(span, gt.span);
            }
            Ok(TypeRef {
                span,
                kind: TypeRefKind::Named { path, args },
            })
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary_expr()
    }

    fn parse_ternary_expr(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            let cond = p.parse_or_expr()?;
            if !p.eat(TokenKind::Question) {
                return Ok(cond);
            }
            let then_expr = p.parse_ternary_expr()?;
            p.expect(TokenKind::Colon)?;
            let else_expr = p.parse_ternary_expr()?;
            let span = join(cond.span, else_expr.span);
            Ok(p.mk(
                span,
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
            ))
        })
    }

    /// One left-associative binary tier.
    fn parse_binary_tier(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        op_for: fn(&TokenKind) -> Option<BinOp>,
    ) -> Result<Expr, ParseError> {
        let base = self.depth;
        let out = self.binary_chain(operand, op_for);
        self.depth = base;
        out
    }

    /// Each operator in the chain adds a level to the tree it builds, so it
    /// is charged against the depth budget like a nested expression.
    fn binary_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        op_for: fn(&TokenKind) -> Option<BinOp>,
    ) -> Result<Expr, ParseError> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek_kind().and_then(op_for) {
            self.deepen()?;
            self.next();
            let right = operand(self)?;
            let span = join(left.span, right.span);
            left = self.mk(
                span,
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_and_expr, |k| match k {
            TokenKind::OrOr => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_eq_expr, |k| match k {
            TokenKind::AndAnd => Some(BinOp::And),
            _ => None,
        })
    }

    fn parse_eq_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_cmp_expr, |k| match k {
            TokenKind::EqEq => Some(BinOp::Eq),
            TokenKind::Neq => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_add_expr, |k| match k {
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Ge => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_mul_expr, |k| match k {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_tier(Self::parse_unary_expr, |k| match k {
            TokenKind::Star => Some(BinOp::Mul),
            TokenKind::Slash => Some(BinOp::Div),
            TokenKind::Percent => Some(BinOp::Rem),
            _ => None,
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Bang) => UnaryOp::Not,
            _ => return self.parse_await_expr(),
        };
        let Some(tok) = self.next() else {
            return Err(self.unexpected("an expression"));
        };
        let inner = self.nested(Self::parse_unary_expr)?;
        let span = join(tok.span, inner.span);
        Ok(self.mk(
            span,
            ExprKind::Unary {
                op,
                expr: Box::new(inner),
            },
        ))
    }

    fn parse_await_expr(&mut self) -> Result<Expr, ParseError> {
        if !self.at(TokenKind::KwAwait) {
            return self.parse_postfix_expr();
        }
        let kw = self.expect(TokenKind::KwAwait)?;
        let inner = self.nested(Self::parse_await_expr)?;
        let span = join(kw.span, inner.span);
        Ok(self.mk(span, ExprKind::Await(Box::new(inner))))
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let out = self.postfix_chain();
        self.depth = base;
        out
    }

    fn postfix_chain(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            if matches!(
                self.peek_kind(),
                Some(TokenKind::Dot | TokenKind::LParen | TokenKind::LBracket)
            ) {
                self.deepen()?;
            }
            if self.eat(TokenKind::Dot) {
                let member = self.expect_ident()?;
                let span = join(expr.span, member.span);
                expr = self.mk(
                    span,
                    ExprKind::Member {
                        base: Box::new(expr),
                        member,
                    },
                );
                continue;
            }

            if self.eat(TokenKind::LParen) {
                let args = self.parse_args()?;
                let rp = self.expect(TokenKind::RParen)?;
                let span = join(expr.span, rp.span);
                expr = self.mk(
                    span,
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
                continue;
            }

            if self.eat(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                let rb = self.expect(TokenKind::RBracket)?;
                let span = join(expr.span, rb.span);
                expr = self.mk(
                    span,
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                );
                continue;
            }

            break;
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.at(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) || self.at(TokenKind::RParen) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        // Layout tokens stay in place so recovery sees the boundary.
        if matches!(
            self.peek_kind(),
            None | Some(TokenKind::Newline | TokenKind::Dedent | TokenKind::Indent | TokenKind::Eof)
        ) {
            return Err(self.unexpected("an expression"));
        }
        let Some(tok) = self.next() else {
            return Err(ParseError::new("unexpected end of input", span_between(0, 0)));
        };

        let kind = match tok.kind {
            TokenKind::Int(n) => ExprKind::IntLit(n),
            TokenKind::Float(f) => ExprKind::FloatLit(f),
            TokenKind::Str(s) => ExprKind::StringLit(s),
            TokenKind::KwTrue => ExprKind::BoolLit(true),
            TokenKind::KwFalse => ExprKind::BoolLit(false),
            TokenKind::Ident(name) => ExprKind::Ident(Ident::new(tok.span, name)),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) || self.at(TokenKind::RBracket) {
                            break;
                        }
                    }
                }
                let rb = self.expect(TokenKind::RBracket)?;
                let span = join(tok.span, rb.span);
                return Ok(self.mk(span, ExprKind::ArrayLit(items)));
            }
            other => {
                return Err(ParseError::new(
                    format!("expected an expression, found {}", other.describe()),
                    tok.span,
                ));
            }
        };
        Ok(self.mk(tok.span, kind))
    }

    fn mk(&mut self, span: Span, kind: ExprKind) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr { id, span, kind }
    }

    /// Runs `f` one nesting level deeper, failing with a resource-limit
    /// error once the configured bound is exceeded.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.deepen()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn deepen(&mut self) -> Result<(), ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError {
                message: format!("nesting exceeds the maximum depth of {}", self.max_depth),
                span: self.peek_span_or_eof(),
                resource_limit: true,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Skips to the end of the current statement. An indented block that
    /// follows a broken header is skipped with it.
    fn recover_to_stmt_boundary(&mut self) {
        let mut depth = 0usize;
        while !self.at(TokenKind::Eof) {
            match self.peek_kind() {
                Some(TokenKind::Indent) => depth += 1,
                Some(TokenKind::Dedent) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.next();
                        return;
                    }
                }
                Some(TokenKind::Newline) if depth == 0 => {
                    self.next();
                    if !self.at(TokenKind::Indent) {
                        return;
                    }
                    continue;
                }
                _ => {}
            }
            self.next();
        }
    }

    /// Skips to the next declaration keyword at the start of a line in the
    /// current module body, or to the dedent closing the module.
    fn recover_to_member(&mut self) {
        let mut depth = 0usize;
        while !self.at(TokenKind::Eof) {
            match self.peek_kind() {
                Some(TokenKind::Indent) => depth += 1,
                Some(TokenKind::Dedent) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Some(k) if depth == 0 && k.starts_declaration() && self.at_line_start() => {
                    return;
                }
                _ => {}
            }
            self.next();
        }
    }

    fn recover_to_module(&mut self) {
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::KwModule) && self.at_line_start() {
                return;
            }
            self.next();
        }
    }

    fn at_line_start(&self) -> bool {
        self.idx == 0
            || self.tokens.get(self.idx - 1).is_some_and(|t| {
                matches!(
                    t.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                )
            })
    }

    fn skip_newlines(&mut self) {
        while self.at(TokenKind::Newline) {
            self.next();
        }
    }

    fn expect_stmt_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Newline) || self.at(TokenKind::Dedent) || self.at(TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(_)) => {}
            _ => return Err(self.unexpected("identifier")),
        }
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident::new(tok.span, name)),
            _ => Err(ParseError::new("expected identifier", tok.span)),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        if !self.at(expected.clone()) {
            return Err(self.unexpected(&expected.describe()));
        }
        self.expect_any()
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        self.next()
            .ok_or_else(|| ParseError::new("unexpected end of input", span_between(0, 0)))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = self
            .peek_kind()
            .map(TokenKind::describe)
            .unwrap_or_else(|| "end of input".to_string());
        ParseError::new(
            format!("expected {expected}, found {found}"),
            self.peek_span_or_eof(),
        )
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    /// Advances past the current token. `Eof` is never consumed, so every
    /// skip loop terminates on it.
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

    fn peek_span_or_eof(&self) -> Span {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| span_between(0, 0))
    }
}
