use std::io;
use thiserror::Error;

/// Ways a single input line can fail while being dispatched or run.
///
/// None of these end the interactive loop: they are reported and the next prompt
/// is shown.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No builtin has the name and it was not found in `PATH`.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// The command was found but the child process could not be started or awaited.
    #[error("{name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Any other failure while running a command, typically writing its output.
    #[error("{name}: {message}")]
    Io { name: String, message: String },
}

impl ShellError {
    /// Whether the message belongs on standard error rather than standard output.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, ShellError::Spawn { .. } | ShellError::Io { .. })
    }

    /// Recover the typed error from a command failure, or wrap whatever else it is.
    pub(crate) fn from_command(name: &str, err: anyhow::Error) -> Self {
        match err.downcast::<ShellError>() {
            Ok(shell) => shell,
            Err(other) => ShellError::Io {
                name: name.to_owned(),
                message: format!("{other:#}"),
            },
        }
    }
}
