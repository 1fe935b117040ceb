use crate::command::{CommandFactory, CommandLine, ExitCode, Stdout};
use crate::env::Environment;
use crate::error::ShellError;
use crate::input::{self, LineReader};
use crate::lexer::Quoting;
use anyhow::Result;
use log::debug;
use std::io::{self, Write};

/// Factory allows creating instances of ExecutableCommand.
///
/// Implemented for the builtins and for ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Prompt shown before every line unless configured otherwise.
pub const DEFAULT_PROMPT: &str = "$ ";

/// A minimal shell-like interpreter that can execute built-in and external commands.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order to create commands by name. See [`Default`] for the
/// factories included out of the box.
///
/// Example
/// ```
/// use tinysh::{Interpreter, MemWriter};
/// let mut sh = Interpreter::default();
/// let out = MemWriter::new();
/// let code = sh.run_line("echo hello    world", Box::new(out.share())).unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out.contents(), "hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    quoting: Quoting,
    prompt: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            quoting: Quoting::default(),
            prompt: DEFAULT_PROMPT.to_owned(),
        }
    }

    /// Replace the captured process environment, e.g. to control `PATH` and `HOME`.
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Tokenize and run one input line.
    ///
    /// A blank line runs nothing and succeeds. Otherwise the first factory that
    /// recognizes the command name wins, so builtins listed before the external
    /// launcher shadow programs of the same name.
    pub fn run_line(
        &mut self,
        raw: &str,
        stdout: Box<dyn Stdout>,
    ) -> std::result::Result<ExitCode, ShellError> {
        let line = CommandLine::parse(raw, self.quoting);
        let Some(name) = line.name() else {
            return Ok(0);
        };

        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, &line) {
                debug!("dispatching {:?} with {} args", name, line.args().len());
                return cmd
                    .execute(stdout, &mut self.env)
                    .map_err(|e| ShellError::from_command(name, e));
            }
        }
        Err(ShellError::CommandNotFound(name.to_owned()))
    }

    /// Read-eval-print loop over the process's standard streams.
    ///
    /// `editor` enables the `rustyline` line editor when stdin is a terminal.
    pub fn repl(&mut self, editor: bool) -> Result<ExitCode> {
        let mut reader = input::open_stdin(editor)?;
        self.repl_with(
            reader.as_mut(),
            || Box::new(io::stdout()),
            &mut io::stderr(),
        )
    }

    /// Read-eval-print loop over arbitrary streams.
    ///
    /// `stdout` is called for a fresh handle whenever a command or the loop itself
    /// prints something; spawn failures go to `stderr`. Returns the status the shell
    /// should exit with: 0 at end of input, or whatever `exit` asked for.
    pub fn repl_with(
        &mut self,
        reader: &mut dyn LineReader,
        mut stdout: impl FnMut() -> Box<dyn Stdout>,
        stderr: &mut dyn Write,
    ) -> Result<ExitCode> {
        loop {
            let Some(raw) = reader.read_line(&self.prompt)? else {
                let mut out = stdout();
                writeln!(out)?;
                out.flush()?;
                debug!("end of input");
                return Ok(0);
            };

            if raw.trim().is_empty() {
                continue;
            }

            match self.run_line(&raw, stdout()) {
                Ok(code) => debug!("status {}", code),
                Err(err) if err.is_diagnostic() => {
                    debug!("reported on stderr: {:?}", err);
                    writeln!(stderr, "{}", err)?;
                }
                Err(err) => {
                    let mut out = stdout();
                    writeln!(out, "{}", err)?;
                    out.flush()?;
                }
            }

            if self.env.should_exit {
                debug!("exit requested with status {}", self.env.exit_code);
                return Ok(self.env.exit_code);
            }
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `exit`, `echo`, `type`, `cd`, `pwd`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}
