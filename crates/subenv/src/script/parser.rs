//! Recursive-descent parser producing statements and expressions.

use serde_json::Value;

use super::lexer::{Tok, Token, syntax_error, tokenize};
use crate::interpreter::Failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Attr(Box<Expr>, String),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign(String, Expr),
    Del(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

/// Parse a block of statements.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, Failure> {
    let mut parser = Parser::new(tokenize(src)?);
    let mut stmts = Vec::new();

    loop {
        parser.skip_ends();
        if parser.at_eof() {
            break;
        }
        stmts.push(parser.statement()?);
        parser.expect_end()?;
    }

    Ok(stmts)
}

/// Parse exactly one expression (leading/trailing blank lines allowed).
pub fn parse_expression(src: &str) -> Result<Expr, Failure> {
    let mut parser = Parser::new(tokenize(src)?);
    parser.skip_ends();
    if parser.at_eof() {
        let t = parser.peek_token();
        return Err(syntax_error("expected an expression", t.line, t.column));
    }
    let expr = parser.expression()?.expr;
    parser.skip_ends();
    if !parser.at_eof() {
        let t = parser.peek_token();
        return Err(syntax_error(
            "eval accepts a single expression",
            t.line,
            t.column,
        ));
    }
    Ok(expr)
}

/// Deepest expression tree the parser will build, and the deepest it will recurse.
///
/// Evaluating and dropping an [`Expr`] both recurse once per level, so this
/// keeps a hostile `- - - ... 1` or `1 + 1 + ... + 1` from overflowing the stack.
pub const MAX_EXPR_DEPTH: usize = 100;

const TOO_DEEP: &str = "expression too deeply nested";

/// A parsed expression and the height of its tree.
struct Node {
    expr: Expr,
    height: usize,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek_token(&self) -> &Token {
        // tokenize always appends a trailing End
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Tok {
        &self.peek_token().tok
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek_token().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if !self.at_eof() && self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w == word) && !self.at_eof()
    }

    /// `name` when the next two tokens are `name =`.
    fn assignment_target(&self) -> Option<String> {
        match (self.peek(), self.peek_at(1)) {
            (Tok::Ident(name), Some(Tok::Assign)) if !self.at_eof() => Some(name.clone()),
            _ => None,
        }
    }

    fn skip_ends(&mut self) {
        while !self.at_eof() && *self.peek() == Tok::End {
            self.pos += 1;
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Failure {
        let t = self.peek_token();
        syntax_error(message, t.line, t.column)
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), Failure> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    fn expect_end(&mut self) -> Result<(), Failure> {
        if self.at_eof() || self.eat(&Tok::End) {
            Ok(())
        } else {
            Err(self.error_here("invalid syntax"))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, Failure> {
        match self.peek().clone() {
            Tok::Ident(name) if !self.at_eof() => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    fn statement(&mut self) -> Result<Stmt, Failure> {
        let line = self.peek_token().line;

        if self.is_keyword("del") {
            self.pos += 1;
            let name = self.ident("a name after 'del'")?;
            return Ok(Stmt {
                kind: StmtKind::Del(name),
                line,
            });
        }

        if let Some(name) = self.assignment_target() {
            if is_reserved(&name) {
                return Err(self.error_here(format!("cannot assign to '{name}'")));
            }
            self.pos += 2;
            let value = self.expression()?.expr;
            return Ok(Stmt {
                kind: StmtKind::Assign(name, value),
                line,
            });
        }

        Ok(Stmt {
            kind: StmtKind::Expr(self.expression()?.expr),
            line,
        })
    }

    /// Run one level of recursive descent, refusing to go past [`MAX_EXPR_DEPTH`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, Failure>) -> Result<T, Failure> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(self.error_here(TOO_DEEP));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Wrap `expr` over children whose tallest subtree is `height`.
    fn node(&self, expr: Expr, height: usize) -> Result<Node, Failure> {
        if height >= MAX_EXPR_DEPTH {
            return Err(self.error_here(TOO_DEEP));
        }
        Ok(Node {
            expr,
            height: height + 1,
        })
    }

    fn binary(&self, op: BinOp, lhs: Node, rhs: Node) -> Result<Node, Failure> {
        let height = lhs.height.max(rhs.height);
        self.node(Expr::Binary(op, Box::new(lhs.expr), Box::new(rhs.expr)), height)
    }

    fn expression(&mut self) -> Result<Node, Failure> {
        self.nested(Self::or_expr)
    }

    fn or_expr(&mut self) -> Result<Node, Failure> {
        let mut lhs = self.and_expr()?;
        while self.is_keyword("or") {
            self.pos += 1;
            let rhs = self.and_expr()?;
            let height = lhs.height.max(rhs.height);
            lhs = self.node(Expr::Or(Box::new(lhs.expr), Box::new(rhs.expr)), height)?;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Node, Failure> {
        let mut lhs = self.not_expr()?;
        while self.is_keyword("and") {
            self.pos += 1;
            let rhs = self.not_expr()?;
            let height = lhs.height.max(rhs.height);
            lhs = self.node(Expr::And(Box::new(lhs.expr), Box::new(rhs.expr)), height)?;
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Node, Failure> {
        if self.is_keyword("not") {
            self.pos += 1;
            let inner = self.nested(Self::not_expr)?;
            return self.node(Expr::Not(Box::new(inner.expr)), inner.height);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, Failure> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Tok::Eq => BinOp::Eq,
            Tok::Ne => BinOp::Ne,
            Tok::Lt => BinOp::Lt,
            Tok::Le => BinOp::Le,
            Tok::Gt => BinOp::Gt,
            Tok::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        self.binary(op, lhs, rhs)
    }

    fn additive(&mut self) -> Result<Node, Failure> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn term(&mut self) -> Result<Node, Failure> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::SlashSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn unary(&mut self) -> Result<Node, Failure> {
        if self.eat(&Tok::Minus) {
            let inner = self.nested(Self::unary)?;
            return self.node(Expr::Neg(Box::new(inner.expr)), inner.height);
        }
        if self.eat(&Tok::Plus) {
            return self.nested(Self::unary);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Node, Failure> {
        let mut node = self.primary()?;
        loop {
            if self.eat(&Tok::LBracket) {
                let index = self.expression()?;
                self.expect(Tok::RBracket, "']'")?;
                let height = node.height.max(index.height);
                node = self.node(Expr::Index(Box::new(node.expr), Box::new(index.expr)), height)?;
            } else if self.eat(&Tok::Dot) {
                let attr = self.ident("an attribute name after '.'")?;
                let height = node.height;
                node = self.node(Expr::Attr(Box::new(node.expr), attr), height)?;
            } else if self.eat(&Tok::LParen) {
                let (args, kwargs, height) = self.call_args()?;
                let height = height.max(node.height);
                let call = Expr::Call {
                    callee: Box::new(node.expr),
                    args,
                    kwargs,
                };
                node = self.node(call, height)?;
            } else {
                return Ok(node);
            }
        }
    }

    /// Arguments up to the closing paren, plus the tallest argument's height.
    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>, usize), Failure> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        let mut height = 0;

        while !self.eat(&Tok::RParen) {
            if let Some(name) = self.assignment_target() {
                self.pos += 2;
                let value = self.expression()?;
                height = height.max(value.height);
                kwargs.push((name, value.expr));
            } else if kwargs.is_empty() {
                let value = self.expression()?;
                height = height.max(value.height);
                args.push(value.expr);
            } else {
                return Err(self.error_here("positional argument follows keyword argument"));
            }
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen, "',' or ')'")?;
                break;
            }
        }

        Ok((args, kwargs, height))
    }

    fn primary(&mut self) -> Result<Node, Failure> {
        if self.at_eof() {
            return Err(self.error_here("unexpected end of input"));
        }
        let token = self.advance();
        let leaf = |expr: Expr| -> Result<Node, Failure> { Ok(Node { expr, height: 1 }) };
        match token.tok {
            Tok::Int(i) => leaf(Expr::Literal(Value::from(i))),
            Tok::Float(f) => match serde_json::Number::from_f64(f) {
                Some(n) => leaf(Expr::Literal(Value::Number(n))),
                None => Err(syntax_error("invalid float literal", token.line, token.column)),
            },
            Tok::Str(s) => leaf(Expr::Literal(Value::String(s))),
            Tok::Ident(name) => leaf(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "null" | "None" => Expr::Literal(Value::Null),
                _ if is_reserved(&name) => {
                    return Err(syntax_error(
                        format!("unexpected keyword '{name}'"),
                        token.line,
                        token.column,
                    ));
                }
                _ => Expr::Name(name),
            }),
            Tok::LParen => {
                let inner = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                let mut height = 0;
                while !self.eat(&Tok::RBracket) {
                    let item = self.expression()?;
                    height = height.max(item.height);
                    items.push(item.expr);
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBracket, "',' or ']'")?;
                        break;
                    }
                }
                self.node(Expr::List(items), height)
            }
            Tok::LBrace => {
                let mut entries = Vec::new();
                let mut height = 0;
                while !self.eat(&Tok::RBrace) {
                    let key = self.expression()?;
                    self.expect(Tok::Colon, "':'")?;
                    let value = self.expression()?;
                    height = height.max(key.height).max(value.height);
                    entries.push((key.expr, value.expr));
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBrace, "',' or '}'")?;
                        break;
                    }
                }
                self.node(Expr::Dict(entries), height)
            }
            other => Err(syntax_error(
                format!("unexpected token {other:?}"),
                token.line,
                token.column,
            )),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "and" | "or" | "not" | "del" | "true" | "false" | "null" | "True" | "False" | "None"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(v: Value) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    #[test]
    fn precedence() {
        let e = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Add,
                lit(json!(1)),
                Box::new(Expr::Binary(BinOp::Mul, lit(json!(2)), lit(json!(3))))
            )
        );
    }

    #[test]
    fn assignment_and_del() {
        let stmts = parse_program("x = 1; del y\n\nz").unwrap();
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0].kind, StmtKind::Assign("x".into(), Expr::Literal(json!(1))));
        assert_eq!(stmts[1].kind, StmtKind::Del("y".into()));
        assert_eq!(stmts[2].line, 3);
    }

    #[test]
    fn equality_is_not_assignment() {
        let stmts = parse_program("x == 1").unwrap();
        assert!(matches!(stmts[0].kind, StmtKind::Expr(Expr::Binary(BinOp::Eq, _, _))));
    }

    #[test]
    fn call_with_keywords() {
        let e = parse_expression("math.pow(2, exp=3)").unwrap();
        match e {
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                assert_eq!(*callee, Expr::Attr(Box::new(Expr::Name("math".into())), "pow".into()));
                assert_eq!(args, vec![Expr::Literal(json!(2))]);
                assert_eq!(kwargs, vec![("exp".to_string(), Expr::Literal(json!(3)))]);
            }
            other => panic!("not a call: {other:?}"),
        }
    }

    #[test]
    fn collections_allow_trailing_commas() {
        let e = parse_expression("{\"a\": [1, 2,], }").unwrap();
        assert!(matches!(e, Expr::Dict(ref entries) if entries.len() == 1));
    }

    #[test]
    fn eval_rejects_statements() {
        assert_eq!(parse_expression("x = 1").unwrap_err().kind, "SyntaxError");
        assert_eq!(parse_expression("1; 2").unwrap_err().kind, "SyntaxError");
        assert_eq!(parse_expression("  ").unwrap_err().kind, "SyntaxError");
    }

    #[test]
    fn keyword_positional_order_enforced() {
        let err = parse_expression("f(a=1, 2)").unwrap_err();
        assert!(err.message.contains("positional argument follows keyword"));
    }

    #[test]
    fn long_chains_are_rejected_not_recursed() {
        let cases = [
            format!("{}1", "-".repeat(200_000)),
            format!("{}1", "+".repeat(200_000)),
            format!("{}x", "not ".repeat(200_000)),
            vec!["1"; 300_000].join("+"),
            vec!["x"; 300_000].join(" and "),
            format!("x{}", ".a".repeat(300_000)),
        ];
        for src in &cases {
            let err = parse_expression(src).unwrap_err();
            assert_eq!(err.kind, "SyntaxError");
            assert_eq!(err.message, "expression too deeply nested");
        }

        let err = parse_program(&format!("y = {}", vec!["2"; 10_000].join(" * "))).unwrap_err();
        assert_eq!(err.message, "expression too deeply nested");
    }

    #[test]
    fn chains_under_the_limit_parse() {
        let sum = vec!["1"; MAX_EXPR_DEPTH - 1].join("+");
        assert!(parse_expression(&sum).is_ok());
        assert!(parse_expression(&format!("{}1", "-".repeat(MAX_EXPR_DEPTH / 2))).is_ok());
    }

    #[test]
    fn cannot_assign_to_keyword() {
        assert_eq!(parse_program("None = 1").unwrap_err().kind, "SyntaxError");
    }
}
