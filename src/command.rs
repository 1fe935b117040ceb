use crate::env::Environment;
use crate::lexer::{self, Quoting, Word};
use anyhow::Result;
use std::io::Write;
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write` and `Into<Stdio>`
/// (e.g. `std::io::Stdout`).
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// One line of user input together with its words.
///
/// The raw text is kept so that commands which care about the exact spelling of
/// their arguments (like `echo`) can look past the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    raw: String,
    words: Vec<Word>,
    quoting: Quoting,
}

impl CommandLine {
    /// Tokenize `raw` with the given quoting mode.
    pub fn parse(raw: impl Into<String>, quoting: Quoting) -> Self {
        let raw = raw.into();
        let words = lexer::tokenize(&raw, quoting);
        Self {
            raw,
            words,
            quoting,
        }
    }

    /// True when the line holds no words at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The command name, i.e. the first word.
    pub fn name(&self) -> Option<&str> {
        self.words.first().map(|w| w.text.as_str())
    }

    /// Every word after the command name.
    pub fn args(&self) -> Vec<&str> {
        self.words.iter().skip(1).map(|w| w.text.as_str()).collect()
    }

    /// Untokenized text following the command name, quotes and spacing intact.
    pub fn rest(&self) -> &str {
        match self.words.first() {
            Some(first) => &self.raw[first.end..],
            None => "",
        }
    }

    pub fn quoting(&self) -> Quoting {
        self.quoting
    }
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command, writing its output to `stdout`.
    fn execute(self: Box<Self>, stdout: Box<dyn Stdout>, env: &mut Environment)
    -> Result<ExitCode>;
}

/// Factory that tries to create a command from a parsed line.
///
/// Returns `None` when the factory doesn't recognize the command name.
/// Implementations can use the environment to resolve executables (e.g., using PATH).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided line.
    fn try_create(&self, env: &Environment, line: &CommandLine)
    -> Option<Box<dyn ExecutableCommand>>;
}
