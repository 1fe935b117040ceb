//! Sources of input lines for the interactive loop.

use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, IsTerminal, StdinLock, Write};

/// Something the interpreter can prompt and read a line from.
pub trait LineReader {
    /// Shows `prompt` and reads one line with its terminator removed.
    ///
    /// Returns `Ok(None)` once the input is exhausted.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Interactive terminal input backed by `rustyline`.
///
/// Lines are not added to any history. Ctrl-C discards the current line and
/// yields an empty one, so the caller simply prompts again.
pub struct Terminal {
    editor: DefaultEditor,
}

impl Terminal {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to initialize line editor")?;
        Ok(Self { editor })
    }
}

impl LineReader for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err).context("failed to read line"),
        }
    }
}

/// Plain buffered input, used for pipes, files and tests.
///
/// The prompt is written to `prompt_out` and flushed before every read.
pub struct Buffered<R, W> {
    input: R,
    prompt_out: W,
}

impl<R: BufRead, W: Write> Buffered<R, W> {
    pub fn new(input: R, prompt_out: W) -> Self {
        Self { input, prompt_out }
    }
}

impl Buffered<StdinLock<'static>, io::Stdout> {
    /// Reads from the process's standard input and prompts on standard output.
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LineReader for Buffered<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.prompt_out, "{}", prompt)?;
        self.prompt_out.flush()?;

        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Picks the line source for the process's standard input.
///
/// The line editor is used only when `editor` is requested and stdin is a terminal.
pub fn open_stdin(editor: bool) -> Result<Box<dyn LineReader>> {
    if editor && io::stdin().is_terminal() {
        Ok(Box::new(Terminal::new()?))
    } else {
        Ok(Box::new(Buffered::stdin()))
    }
}
