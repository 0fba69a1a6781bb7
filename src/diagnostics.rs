use std::fmt;

use thiserror::Error;

/// A 1-based line/column location within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Tokenization failure. The lexer stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {pos}")]
pub struct LexError {
    pub message: String,
    pub pos: Position,
}

impl LexError {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// The first unexpected token seen by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found} at {pos}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub pos: Position,
}

impl ParseError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>, pos: Position) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
            pos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    UndefinedVariable,
    TypeError,
    IndexError,
    KeyError,
    ArityError,
    UncaughtControlSignal,
    HostError,
    DivisionByZero,
    RecursionLimit,
}

impl RuntimeErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeErrorKind::UndefinedVariable => "UndefinedVariable",
            RuntimeErrorKind::TypeError => "TypeError",
            RuntimeErrorKind::IndexError => "IndexError",
            RuntimeErrorKind::KeyError => "KeyError",
            RuntimeErrorKind::ArityError => "ArityError",
            RuntimeErrorKind::UncaughtControlSignal => "UncaughtControlSignal",
            RuntimeErrorKind::HostError => "HostError",
            RuntimeErrorKind::DivisionByZero => "DivisionByZero",
            RuntimeErrorKind::RecursionLimit => "RecursionLimit",
        }
    }
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure raised while walking the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub pos: Option<Position>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    /// Attaches a position unless a more precise one was recorded already.
    pub fn at(mut self, pos: Position) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::UndefinedVariable,
            format!("undefined variable `{name}`"),
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::TypeError, message)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " at {pos}")?;
        }
        Ok(())
    }
}

/// Error returned by a host callback. Only the message crosses into the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Unified error type for the Tombo toolchain.
#[derive(Debug, Error)]
pub enum TomboError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TomboError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            TomboError::Lex(_) => DiagnosticKind::Lexer,
            TomboError::Parse(_) => DiagnosticKind::Parser,
            TomboError::Runtime(err) => DiagnosticKind::Runtime(err.kind),
            TomboError::Io(_) => DiagnosticKind::Io,
        }
    }

    pub fn message(&self) -> String {
        match self {
            TomboError::Lex(err) => err.message.clone(),
            TomboError::Parse(err) => format!("expected {}, found {}", err.expected, err.found),
            TomboError::Runtime(err) => err.message.clone(),
            TomboError::Io(err) => err.to_string(),
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            TomboError::Lex(err) => Some(err.pos),
            TomboError::Parse(err) => Some(err.pos),
            TomboError::Runtime(err) => err.pos,
            TomboError::Io(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            kind: self.kind(),
            message: self.message(),
            pos: self.position(),
            notes: Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TomboError>;

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Runtime(RuntimeErrorKind),
    Io,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lexer => f.write_str("LexError"),
            DiagnosticKind::Parser => f.write_str("ParseError"),
            DiagnosticKind::Runtime(kind) => write!(f, "RuntimeError({kind})"),
            DiagnosticKind::Io => f.write_str("IoError"),
        }
    }
}

/// Kind, message and position of an error, ready to be shown to a user.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub pos: Option<Position>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Formats the diagnostic followed by the surrounding source lines, with a
    /// caret under the reported column.
    pub fn render(&self, source: &str) -> String {
        let mut out = self.to_string();
        let Some(pos) = self.pos else {
            return out;
        };
        let lines: Vec<&str> = source.lines().collect();
        if pos.line == 0 || pos.line > lines.len() {
            return out;
        }
        let first = pos.line.saturating_sub(2).max(1);
        let last = (pos.line + 1).min(lines.len());
        let width = last.to_string().len();
        out.push('\n');
        for number in first..=last {
            let marker = if number == pos.line { ">" } else { " " };
            out.push_str(&format!(
                "{marker} {number:>width$} | {}\n",
                lines[number - 1]
            ));
            if number == pos.line {
                let pad = " ".repeat(pos.column.saturating_sub(1));
                out.push_str(&format!("  {:>width$} | {pad}^\n", ""));
            }
        }
        out.truncate(out.trim_end().len());
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " ({pos})")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_keeps_first_position() {
        let err = RuntimeError::type_error("bad operand")
            .at(Position::new(3, 4))
            .at(Position::new(1, 1));
        assert_eq!(err.pos, Some(Position::new(3, 4)));
        assert_eq!(err.to_string(), "TypeError: bad operand at line 3, column 4");
    }

    #[test]
    fn every_error_exposes_kind_message_and_position() {
        let err = TomboError::from(ParseError::new("`end`", "end of input", Position::new(2, 1)));
        assert_eq!(err.kind(), DiagnosticKind::Parser);
        assert_eq!(err.message(), "expected `end`, found end of input");
        assert_eq!(err.position(), Some(Position::new(2, 1)));
    }

    #[test]
    fn render_points_at_column() {
        let source = "let a = 1\nlet b = a + \"x\"\nprintln(b)\n";
        let diagnostic = TomboError::from(
            RuntimeError::type_error("cannot apply `+` to Number and String")
                .at(Position::new(2, 11)),
        )
        .diagnostic();
        let rendered = diagnostic.render(source);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines[0],
            "RuntimeError(TypeError): cannot apply `+` to Number and String (line 2, column 11)"
        );
        assert_eq!(lines[1], "  1 | let a = 1");
        assert_eq!(lines[2], "> 2 | let b = a + \"x\"");
        assert_eq!(lines[3], "    |           ^");
        assert_eq!(lines[4], "  3 | println(b)");
    }

    #[test]
    fn render_without_position_is_plain() {
        let diagnostic = TomboError::from(RuntimeError::undefined("x")).diagnostic();
        assert_eq!(
            diagnostic.render("x\n"),
            "RuntimeError(UndefinedVariable): undefined variable `x`"
        );
    }
}
