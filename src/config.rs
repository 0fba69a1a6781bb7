/// Nesting limit for script calls. Native stack grows on demand, so this
/// bounds runaway recursion rather than protecting the host thread.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

pub const DEFAULT_TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerOptions {
    /// Emit `Indent`/`Dedent` markers. They never affect block structure.
    pub emit_indentation: bool,
    pub tab_width: usize,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            emit_indentation: true,
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_call_depth: usize,
    pub lexer: LexerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // set default values here, unless overridden via command-line
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            lexer: LexerOptions::default(),
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_lexer(mut self, lexer: LexerOptions) -> Self {
        self.lexer = lexer;
        self
    }
}
