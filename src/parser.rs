use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, Expr, ExprKind, FunctionDef, Literal, LogicalOp, Param, Program, Stmt,
        StmtKind, UnaryOp,
    },
    diagnostics::{ParseError, Position, TomboError},
    lexer::{tokenize, Keyword, Token, TokenKind},
    stack::ensure_sufficient_stack,
};

/// Binding power of prefix `-`, `!` and `not`. Sits between multiplicative
/// operators and `**`, so `-2 ** 2` parses as `-(2 ** 2)`.
const PREFIX_BP: u8 = 13;

#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Left and right binding powers for infix operators, weakest first.
fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8, Infix)> {
    use BinaryOp::*;
    let entry = match kind {
        TokenKind::DoublePipe | TokenKind::Keyword(Keyword::Or) => {
            (1, 2, Infix::Logical(LogicalOp::Or))
        }
        TokenKind::DoubleAmpersand | TokenKind::Keyword(Keyword::And) => {
            (3, 4, Infix::Logical(LogicalOp::And))
        }
        TokenKind::EqualEqual => (5, 6, Infix::Binary(Equal)),
        TokenKind::BangEqual => (5, 6, Infix::Binary(NotEqual)),
        TokenKind::Less => (7, 8, Infix::Binary(Less)),
        TokenKind::LessEqual => (7, 8, Infix::Binary(LessEqual)),
        TokenKind::Greater => (7, 8, Infix::Binary(Greater)),
        TokenKind::GreaterEqual => (7, 8, Infix::Binary(GreaterEqual)),
        TokenKind::Plus => (9, 10, Infix::Binary(Add)),
        TokenKind::Minus => (9, 10, Infix::Binary(Sub)),
        TokenKind::Star => (11, 12, Infix::Binary(Mul)),
        TokenKind::Slash => (11, 12, Infix::Binary(Div)),
        TokenKind::Percent => (11, 12, Infix::Binary(Mod)),
        // right-associative
        TokenKind::StarStar => (15, 14, Infix::Binary(Pow)),
        _ => return None,
    };
    Some(entry)
}

fn compound_operator(kind: TokenKind) -> Option<Option<BinaryOp>> {
    match kind {
        TokenKind::Assign => Some(None),
        TokenKind::PlusAssign => Some(Some(BinaryOp::Add)),
        TokenKind::MinusAssign => Some(Some(BinaryOp::Sub)),
        TokenKind::StarAssign => Some(Some(BinaryOp::Mul)),
        TokenKind::SlashAssign => Some(Some(BinaryOp::Div)),
        _ => None,
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

pub fn parse_source(source: &str) -> Result<Program, TomboError> {
    let tokens = tokenize(source)?;
    Ok(parse(tokens)?)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        // `end` closes blocks; indentation markers carry no structure here
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|token| !token.kind.is_indentation())
            .collect();
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let pos = tokens.last().map(|token| token.pos).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                pos,
            });
        }
        Self { tokens, current: 0 }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let statements = self.parse_block(&[])?;
        Ok(Program { statements })
    }

    /// Parses statements until one of `terminators` (not consumed) or Eof.
    fn parse_block(&mut self, terminators: &[Keyword]) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.check(TokenKind::Eof)
                || terminators.iter().any(|keyword| self.check_keyword(*keyword))
            {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        ensure_sufficient_stack(|| self.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ParseError> {
        let kind = self.peek().kind;
        let stmt = match kind {
            TokenKind::Keyword(Keyword::Let) => self.parse_let()?,
            TokenKind::Keyword(Keyword::Change) => self.parse_change()?,
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Function | Keyword::Def | Keyword::Defi)
                if self.check_next(TokenKind::Identifier) =>
            {
                self.parse_function_decl()?
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return()?,
            TokenKind::Keyword(Keyword::Break) => {
                let pos = self.advance().pos;
                Stmt {
                    kind: StmtKind::Break,
                    pos,
                }
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let pos = self.advance().pos;
                Stmt {
                    kind: StmtKind::Continue,
                    pos,
                }
            }
            _ => self.parse_expression_statement()?,
        };
        self.end_of_statement()?;
        Ok(stmt)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Keyword(Keyword::End | Keyword::Else | Keyword::Elif)
        )
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        if self.matches(TokenKind::Newline) || self.matches(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.at_statement_end() {
            return Ok(());
        }
        Err(self.error("end of statement"))
    }

    fn parse_let(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let name = self.consume_identifier("variable name after `let`")?;
        self.consume(TokenKind::Assign, "`=`")?;
        let initializer = self.parse_expression()?;
        Ok(Stmt {
            kind: StmtKind::Let {
                name: name.lexeme,
                initializer,
            },
            pos,
        })
    }

    fn parse_change(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let target = self.parse_expression()?;
        self.check_assignment_target(&target)?;
        self.consume_keyword(Keyword::To)?;
        let value = self.parse_expression()?;
        Ok(Stmt {
            kind: StmtKind::Assign {
                target,
                op: None,
                value,
            },
            pos,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let stmt = self.parse_if_chain(pos)?;
        self.consume_keyword(Keyword::End)?;
        Ok(stmt)
    }

    /// One `if`/`elif` arm. Chained arms nest in the else branch and share the
    /// caller's `end`.
    fn parse_if_chain(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let condition = self.parse_expression()?;
        self.matches_keyword(Keyword::Then);
        let then_branch = self.parse_block(&[Keyword::Elif, Keyword::Else, Keyword::End])?;
        let else_branch = if self.check_keyword(Keyword::Elif) {
            let pos = self.advance().pos;
            Some(vec![self.parse_if_chain(pos)?])
        } else if self.matches_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                let pos = self.advance().pos;
                Some(vec![self.parse_if_chain(pos)?])
            } else {
                Some(self.parse_block(&[Keyword::End])?)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            pos,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let condition = self.parse_expression()?;
        let body = self.parse_block(&[Keyword::End])?;
        self.consume_keyword(Keyword::End)?;
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            pos,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let binding = self.consume_identifier("loop variable")?;
        self.consume_keyword(Keyword::In)?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block(&[Keyword::End])?;
        self.consume_keyword(Keyword::End)?;
        Ok(Stmt {
            kind: StmtKind::For {
                binding: binding.lexeme,
                iterable,
                body,
            },
            pos,
        })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let name = self.consume_identifier("function name")?;
        let params = self.parse_params()?;
        if keyword.kind == TokenKind::Keyword(Keyword::Defi) && !self.check(TokenKind::FatArrow) {
            return Err(self.error("`=>` after `defi` parameters"));
        }
        let body = self.parse_function_body()?;
        Ok(Stmt {
            kind: StmtKind::Function(Rc::new(FunctionDef {
                name: Some(name.lexeme),
                params,
                body,
                pos: keyword.pos,
            })),
            pos: keyword.pos,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.consume(TokenKind::LParen, "`(` before parameters")?;
        let mut params: Vec<Param> = Vec::new();
        loop {
            self.skip_newlines();
            if self.matches(TokenKind::RParen) {
                break;
            }
            let token = self.consume_identifier("parameter name")?;
            if params.iter().any(|param| param.name == token.lexeme) {
                return Err(ParseError::new(
                    "distinct parameter names",
                    format!("duplicate parameter `{}`", token.lexeme),
                    token.pos,
                ));
            }
            params.push(Param {
                name: token.lexeme,
                pos: token.pos,
            });
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                self.skip_newlines();
                self.consume(TokenKind::RParen, "`)` after parameters")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.matches(TokenKind::FatArrow) {
            let expr = self.parse_expression()?;
            let pos = expr.pos;
            return Ok(vec![Stmt {
                kind: StmtKind::Return(Some(expr)),
                pos,
            }]);
        }
        let body = self.parse_block(&[Keyword::End])?;
        self.consume_keyword(Keyword::End)?;
        Ok(body)
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.advance().pos;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Stmt {
            kind: StmtKind::Return(value),
            pos,
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        let pos = expr.pos;
        let Some(op) = compound_operator(self.peek().kind) else {
            return Ok(Stmt {
                kind: StmtKind::Expr(expr),
                pos,
            });
        };
        self.check_assignment_target(&expr)?;
        self.advance();
        let value = self.parse_expression()?;
        Ok(Stmt {
            kind: StmtKind::Assign {
                target: expr,
                op,
                value,
            },
            pos,
        })
    }

    /// Assignable places are a variable followed by any number of index steps.
    fn check_assignment_target(&self, target: &Expr) -> Result<(), ParseError> {
        match &target.kind {
            ExprKind::Identifier(_) => Ok(()),
            ExprKind::Index { collection, .. } => self.check_assignment_target(collection),
            _ => Err(ParseError::new(
                "assignment target",
                describe_expr(target),
                target.pos,
            )),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        ensure_sufficient_stack(|| self.parse_expr_bp_inner(min_bp))
    }

    fn parse_expr_bp_inner(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;
        while let Some((lbp, rbp, infix)) = infix_binding_power(self.peek().kind) {
            if lbp < min_bp {
                break;
            }
            let pos = self.advance().pos;
            let right = self.parse_expr_bp(rbp)?;
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            let kind = match infix {
                Infix::Binary(op) => ExprKind::Binary {
                    op,
                    left: left_box,
                    right: right_box,
                },
                Infix::Logical(op) => ExprKind::Logical {
                    op,
                    left: left_box,
                    right: right_box,
                },
            };
            left = Expr { kind, pos };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang | TokenKind::Keyword(Keyword::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_postfix();
        };
        let pos = self.advance().pos;
        let operand = self.parse_expr_bp(PREFIX_BP)?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::LParen) {
                let pos = self.advance().pos;
                let args = self.parse_comma_list(TokenKind::RParen, Self::parse_expression)?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    pos,
                };
            } else if self.check(TokenKind::LBracket) {
                let pos = self.advance().pos;
                self.skip_newlines();
                let key = self.parse_expression()?;
                self.skip_newlines();
                self.consume(TokenKind::RBracket, "`]` after index")?;
                expr = Expr {
                    kind: ExprKind::Index {
                        collection: Box::new(expr),
                        key: Box::new(key),
                    },
                    pos,
                };
            } else if self.check(TokenKind::Dot) {
                let pos = self.advance().pos;
                let field = self.consume_identifier("member name after `.`")?;
                let key = Expr {
                    kind: ExprKind::Literal(Literal::String(field.lexeme)),
                    pos: field.pos,
                };
                expr = Expr {
                    kind: ExprKind::Index {
                        collection: Box::new(expr),
                        key: Box::new(key),
                    },
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let literal = |kind| Expr {
            kind: ExprKind::Literal(kind),
            pos: token.pos,
        };
        let expr = match token.kind {
            TokenKind::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    ParseError::new("number", token.describe(), token.pos)
                })?;
                self.advance();
                literal(Literal::Number(value))
            }
            TokenKind::String => {
                self.advance();
                literal(Literal::String(token.lexeme.clone()))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                literal(Literal::Nil)
            }
            TokenKind::Identifier => {
                self.advance();
                Expr {
                    kind: ExprKind::Identifier(token.lexeme.clone()),
                    pos: token.pos,
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expression()?;
                self.skip_newlines();
                self.consume(TokenKind::RParen, "`)`")?;
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_comma_list(TokenKind::RBracket, Self::parse_expression)?;
                Expr {
                    kind: ExprKind::List(elements),
                    pos: token.pos,
                }
            }
            TokenKind::LBrace => {
                self.advance();
                let pairs = self.parse_comma_list(TokenKind::RBrace, Self::parse_map_entry)?;
                Expr {
                    kind: ExprKind::Map(pairs),
                    pos: token.pos,
                }
            }
            TokenKind::Keyword(Keyword::Function | Keyword::Def) => {
                self.advance();
                let params = self.parse_params()?;
                let body = self.parse_function_body()?;
                Expr {
                    kind: ExprKind::Function(Rc::new(FunctionDef {
                        name: None,
                        params,
                        body,
                        pos: token.pos,
                    })),
                    pos: token.pos,
                }
            }
            _ => return Err(self.error("expression")),
        };
        Ok(expr)
    }

    fn parse_map_entry(&mut self) -> Result<(Expr, Expr), ParseError> {
        let key = self.parse_expression()?;
        self.skip_newlines();
        self.consume(TokenKind::Colon, "`:` after map key")?;
        self.skip_newlines();
        let value = self.parse_expression()?;
        Ok((key, value))
    }

    /// Comma separated items up to `close`, which is consumed. Newlines are
    /// insignificant inside the delimiters and a trailing comma is allowed.
    fn parse_comma_list<T>(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.matches(close) {
                break;
            }
            items.push(item(self)?);
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                self.skip_newlines();
                self.consume(close, &close.to_string())?;
                break;
            }
        }
        Ok(items)
    }

    fn skip_newlines(&mut self) {
        while self.matches(TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.matches(TokenKind::Newline) || self.matches(TokenKind::Semicolon) {}
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        let kind = TokenKind::Keyword(keyword);
        self.consume(kind, &kind.to_string())
    }

    fn consume_identifier(&mut self, expected: &str) -> Result<Token, ParseError> {
        self.consume(TokenKind::Identifier, expected)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn check_next(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    // The token list always ends with Eof and `advance` never moves past it.
    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(expected, token.describe(), token.pos)
    }
}

fn describe_expr(expr: &Expr) -> &'static str {
    match expr.kind {
        ExprKind::Literal(_) => "literal",
        ExprKind::List(_) => "list literal",
        ExprKind::Map(_) => "map literal",
        ExprKind::Identifier(_) => "identifier",
        ExprKind::Unary { .. } => "unary expression",
        ExprKind::Binary { .. } => "binary expression",
        ExprKind::Logical { .. } => "logical expression",
        ExprKind::Call { .. } => "call expression",
        ExprKind::Index { .. } => "index expression",
        ExprKind::Function(_) => "function literal",
    }
}
