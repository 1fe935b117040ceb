//! A small interactive command interpreter.
//!
//! Each input line names either one of five builtins (`exit`, `echo`, `type`, `cd`,
//! `pwd`) or an external program found through `PATH`, which is spawned and waited
//! for before the next prompt. There are no pipelines, redirections or jobs.
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`], [`env`]
//! and [`input`] expose the traits and types needed to plug in your own commands,
//! inject an environment, or drive the loop from something other than a terminal.

mod builtin;
pub mod command;
pub mod env;
mod error;
mod external;
pub mod input;
mod interpreter;
mod io_adapters;
mod lexer;

pub use builtin::BUILTINS;
pub use error::ShellError;
pub use external::resolve;
pub use interpreter::{DEFAULT_PROMPT, Interpreter};
pub use io_adapters::MemWriter;
pub use lexer::{Quoting, Word, tokenize};
