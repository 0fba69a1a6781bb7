use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{Result, TomboError},
    runtime::Interpreter,
    value::Value,
};

const PROMPT: &str = ">> ";
const CONTINUATION_PROMPT: &str = ".. ";

/// Result of feeding one line to the REPL.
#[derive(Debug)]
pub enum Submission {
    /// The buffered input is an unfinished block or string.
    Incomplete,
    Evaluated(Value),
    /// Rendered diagnostic for the failed input.
    Failed(String),
}

pub struct Repl {
    interpreter: Interpreter,
    buffer: String,
}

impl Repl {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            buffer: String::new(),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Appends `line` to the pending input and evaluates it once it forms a
    /// complete program. Definitions persist across submissions, including
    /// those made before a runtime error.
    pub fn submit(&mut self, line: &str) -> Submission {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        let source = std::mem::take(&mut self.buffer);
        match self.interpreter.eval_source(&source) {
            Ok(value) => Submission::Evaluated(value),
            Err(err) if is_incomplete(&err) => {
                self.buffer = source;
                Submission::Incomplete
            }
            Err(err) => Submission::Failed(err.diagnostic().render(&source)),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            let prompt = if self.buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            match editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if self.buffer.is_empty() {
                        if trimmed == ":quit" || trimmed == ":exit" {
                            break;
                        }
                        if trimmed.is_empty() {
                            continue;
                        }
                    }
                    editor.add_history_entry(line.as_str()).ok();
                    match self.submit(&line) {
                        Submission::Incomplete => {}
                        Submission::Evaluated(value) if value.is_nil() => {}
                        Submission::Evaluated(value) => println!("{value:?}"),
                        Submission::Failed(report) => eprintln!("{report}"),
                    }
                }
                Err(ReadlineError::Interrupted) if !self.buffer.is_empty() => {
                    self.buffer.clear();
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

/// Input that ran out before a block or string was closed.
fn is_incomplete(err: &TomboError) -> bool {
    match err {
        TomboError::Parse(parse) => parse.found == "end of input",
        TomboError::Lex(lex) => lex.message == "unterminated string literal",
        _ => false,
    }
}

fn readline_error(err: ReadlineError) -> TomboError {
    TomboError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
