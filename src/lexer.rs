use std::{fmt, iter::Peekable, str::Chars};

use crate::{
    config::LexerOptions,
    diagnostics::{LexError, Position},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Change,
    To,
    If,
    Then,
    Elif,
    Else,
    For,
    In,
    While,
    Function,
    Def,
    Defi,
    Return,
    Break,
    Continue,
    End,
    True,
    False,
    Nil,
    And,
    Or,
    Not,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Change => "change",
            Keyword::To => "to",
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::While => "while",
            Keyword::Function => "function",
            Keyword::Def => "def",
            Keyword::Defi => "defi",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::End => "end",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Nil => "nil",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    FatArrow,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn is_indentation(self) -> bool {
        matches!(self, TokenKind::Indent | TokenKind::Dedent)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Keyword(keyword) => return write!(f, "`{}`", keyword.as_str()),
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Dot => "`.`",
            TokenKind::Colon => "`:`",
            TokenKind::Semicolon => "`;`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::Assign => "`=`",
            TokenKind::PlusAssign => "`+=`",
            TokenKind::MinusAssign => "`-=`",
            TokenKind::StarAssign => "`*=`",
            TokenKind::SlashAssign => "`/=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::StarStar => "`**`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::DoubleAmpersand => "`&&`",
            TokenKind::DoublePipe => "`||`",
            TokenKind::Bang => "`!`",
            TokenKind::BangEqual => "`!=`",
            TokenKind::EqualEqual => "`==`",
            TokenKind::Less => "`<`",
            TokenKind::LessEqual => "`<=`",
            TokenKind::Greater => "`>`",
            TokenKind::GreaterEqual => "`>=`",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text, or the unescaped contents for string literals.
    pub lexeme: String,
    pub pos: Position,
}

impl Token {
    /// Human readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Identifier => format!("identifier `{}`", self.lexeme),
            TokenKind::Number => format!("number `{}`", self.lexeme),
            TokenKind::String => format!("string {:?}", self.lexeme),
            other => other.to_string(),
        }
    }
}

/// Tokenizes `source` with the default options.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    options: LexerOptions,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            options: LexerOptions::default(),
            tokens: Vec::new(),
            indent_stack: vec![0],
            at_line_start: true,
        }
    }

    pub fn with_options(mut self, options: LexerOptions) -> Self {
        self.options = options;
        self
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_comment(&mut self) -> bool {
        match self.peek() {
            Some('#') => true,
            Some('/') => self.peek_second() == Some('/'),
            _ => false,
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, pos: Position) {
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.into(),
            pos,
        });
    }

    fn push_newline(&mut self, pos: Position) {
        match self.tokens.last() {
            None => {}
            Some(last) if last.kind == TokenKind::Newline => {}
            Some(_) => self.push(TokenKind::Newline, "\n", pos),
        }
    }

    /// Measures leading whitespace and emits indentation markers. Blank and
    /// comment-only lines leave the indentation stack alone.
    fn line_start(&mut self) {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width += self.options.tab_width,
                _ => break,
            }
            self.bump();
        }
        if matches!(self.peek(), None | Some('\n') | Some('\r')) || self.at_comment() {
            return;
        }
        if !self.options.emit_indentation {
            return;
        }
        let pos = self.position();
        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, "", pos);
        } else if width < current {
            while self.indent_stack.len() > 1
                && self.indent_stack.last().is_some_and(|&level| level > width)
            {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, "", pos);
            }
            if self.indent_stack.last().is_some_and(|&level| level < width) {
                self.indent_stack.push(width);
                self.push(TokenKind::Indent, "", pos);
            }
        }
    }

    fn identifier_or_keyword(&mut self, first: char, pos: Position) {
        let mut lexeme = String::from(first);
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                lexeme.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        self.push(kind, lexeme, pos);
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn number_literal(&mut self, first: char, pos: Position) -> Result<(), LexError> {
        let mut text = String::from(first);
        self.digits(&mut text);
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            self.digits(&mut text);
            if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                text.push('.');
                return Err(LexError::new(
                    format!("malformed number literal `{text}`"),
                    pos,
                ));
            }
        }
        if let Some(marker @ ('e' | 'E')) = self.peek() {
            text.push(marker);
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError::new(
                    format!("malformed number literal `{text}`: missing exponent digits"),
                    pos,
                ));
            }
            self.digits(&mut text);
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            while let Some(ch) = self.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            return Err(LexError::new(
                format!("malformed number literal `{text}`"),
                pos,
            ));
        }
        if text.parse::<f64>().is_err() {
            return Err(LexError::new(
                format!("malformed number literal `{text}`"),
                pos,
            ));
        }
        self.push(TokenKind::Number, text, pos);
        Ok(())
    }

    fn string_literal(&mut self, quote: char, pos: Position) -> Result<(), LexError> {
        let mut value = String::new();
        while let Some(ch) = self.bump() {
            match ch {
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                    None => break,
                },
                _ if ch == quote => {
                    self.push(TokenKind::String, value, pos);
                    return Ok(());
                }
                _ => value.push(ch),
            }
        }
        Err(LexError::new("unterminated string literal", pos))
    }

    fn operator(&mut self, ch: char, pos: Position) -> Result<(), LexError> {
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '%' => TokenKind::Percent,
            '+' if self.match_next('=') => TokenKind::PlusAssign,
            '+' => TokenKind::Plus,
            '-' if self.match_next('=') => TokenKind::MinusAssign,
            '-' => TokenKind::Minus,
            '*' if self.match_next('*') => TokenKind::StarStar,
            '*' if self.match_next('=') => TokenKind::StarAssign,
            '*' => TokenKind::Star,
            '/' if self.match_next('=') => TokenKind::SlashAssign,
            '/' => TokenKind::Slash,
            '=' if self.match_next('>') => TokenKind::FatArrow,
            '=' if self.match_next('=') => TokenKind::EqualEqual,
            '=' => TokenKind::Assign,
            '!' if self.match_next('=') => TokenKind::BangEqual,
            '!' => TokenKind::Bang,
            '<' if self.match_next('=') => TokenKind::LessEqual,
            '<' => TokenKind::Less,
            '>' if self.match_next('=') => TokenKind::GreaterEqual,
            '>' => TokenKind::Greater,
            '&' if self.match_next('&') => TokenKind::DoubleAmpersand,
            '|' if self.match_next('|') => TokenKind::DoublePipe,
            other => {
                return Err(LexError::new(
                    format!("unexpected character `{}`", other.escape_default()),
                    pos,
                ));
            }
        };
        let end = self.column;
        let width = end.saturating_sub(pos.column).max(1);
        let lexeme = match width {
            1 => ch.to_string(),
            _ => kind.to_string().trim_matches('`').to_string(),
        };
        self.push(kind, lexeme, pos);
        Ok(())
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            if self.at_line_start {
                self.at_line_start = false;
                self.line_start();
            }
            let Some(ch) = self.peek() else {
                break;
            };
            match ch {
                '\n' => {
                    let pos = self.position();
                    self.bump();
                    self.push_newline(pos);
                    self.at_line_start = true;
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                _ if self.at_comment() => self.skip_comment(),
                _ => {
                    let pos = self.position();
                    self.bump();
                    match ch {
                        'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch, pos),
                        c if c.is_alphabetic() => self.identifier_or_keyword(ch, pos),
                        '0'..='9' => self.number_literal(ch, pos)?,
                        '"' | '\'' => self.string_literal(ch, pos)?,
                        _ => self.operator(ch, pos)?,
                    }
                }
            }
        }

        let pos = self.position();
        self.push_newline(pos);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, "", pos);
        }
        self.push(TokenKind::Eof, "", pos);
        Ok(self.tokens)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "let" => Kw::Let,
        "change" => Kw::Change,
        "to" => Kw::To,
        "if" => Kw::If,
        "then" => Kw::Then,
        "elif" => Kw::Elif,
        "else" => Kw::Else,
        "for" => Kw::For,
        "in" => Kw::In,
        "while" => Kw::While,
        "function" => Kw::Function,
        "def" => Kw::Def,
        "defi" => Kw::Defi,
        "return" => Kw::Return,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "end" => Kw::End,
        "true" => Kw::True,
        "false" => Kw::False,
        "nil" => Kw::Nil,
        "and" => Kw::And,
        "or" => Kw::Or,
        "not" => Kw::Not,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn let_statement_tokens() {
        let tokens = tokenize("let d = 10\n").expect("tokenize");
        let summary: Vec<(TokenKind, &str)> = tokens
            .iter()
            .map(|token| (token.kind, token.lexeme.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::Keyword(Keyword::Let), "let"),
                (TokenKind::Identifier, "d"),
                (TokenKind::Assign, "="),
                (TokenKind::Number, "10"),
                (TokenKind::Newline, "\n"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = tokenize("let x = 1\n  x += 2").expect("tokenize");
        let positions: Vec<(TokenKind, usize, usize)> = tokens
            .iter()
            .map(|token| (token.kind, token.pos.line, token.pos.column))
            .collect();
        assert_eq!(
            positions,
            vec![
                (TokenKind::Keyword(Keyword::Let), 1, 1),
                (TokenKind::Identifier, 1, 5),
                (TokenKind::Assign, 1, 7),
                (TokenKind::Number, 1, 9),
                (TokenKind::Newline, 1, 10),
                (TokenKind::Indent, 2, 3),
                (TokenKind::Identifier, 2, 3),
                (TokenKind::PlusAssign, 2, 5),
                (TokenKind::Number, 2, 8),
                (TokenKind::Newline, 2, 9),
                (TokenKind::Dedent, 2, 9),
                (TokenKind::Eof, 2, 9),
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_emit_no_newline() {
        let source = "a\n\n   # just a comment\n// another\nb\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn trailing_comment_is_discarded() {
        assert_eq!(
            kinds("x = 1 # set x"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn multi_character_operators() {
        assert_eq!(
            kinds("== != <= >= && || ** => += -= *= /= < > ! ="),
            vec![
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::DoubleAmpersand,
                TokenKind::DoublePipe,
                TokenKind::StarStar,
                TokenKind::FatArrow,
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Bang,
                TokenKind::Assign,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn operator_lexemes_match_source() {
        let tokens = tokenize("a <= b").expect("tokenize");
        assert_eq!(tokens[1].lexeme, "<=");
    }

    #[test]
    fn keywords_after_identifier_match() {
        let tokens = tokenize("ending end endx").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].kind, TokenKind::Keyword(Keyword::End));
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("3.14 42 1.5e-10 2E3 7.").expect("tokenize");
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(&lexemes[..6], &["3.14", "42", "1.5e-10", "2E3", "7", "."]);
    }

    #[test]
    fn malformed_numbers() {
        for source in ["1e", "1.2.3", "12abc", "3e+"] {
            let err = tokenize(source).expect_err(source);
            assert!(err.message.contains("malformed number"), "{err}");
            assert_eq!(err.pos, Position::new(1, 1));
        }
    }

    #[test]
    fn string_escapes_and_quotes() {
        let tokens = tokenize(r#""a\n\t\"b\\" 'it\'s'"#).expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "a\n\t\"b\\");
        assert_eq!(tokens[1].lexeme, "it's");
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize("let s = \"open").expect_err("unterminated");
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.pos, Position::new(1, 9));
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("let a = 1\nlet b = @").expect_err("bad char");
        assert_eq!(err.message, "unexpected character `@`");
        assert_eq!(err.pos, Position::new(2, 9));

        let err = tokenize("a & b").expect_err("single ampersand");
        assert_eq!(err.pos, Position::new(1, 3));
    }

    #[test]
    fn indentation_markers() {
        let source = "if a\n    b\n        c\nd\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Dedent,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_can_be_disabled() {
        let tokens = Lexer::new("a\n  b\n")
            .with_options(LexerOptions {
                emit_indentation: false,
                ..LexerOptions::default()
            })
            .tokenize()
            .expect("tokenize");
        assert!(tokens.iter().all(|token| !token.kind.is_indentation()));
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("\n\n# nothing\n"), vec![TokenKind::Eof]);
    }
}
