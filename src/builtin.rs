use crate::command::{CommandFactory, CommandLine, ExecutableCommand, ExitCode, Stdout};
use crate::env::Environment;
use crate::external::resolve;
use crate::interpreter::Factory;
use crate::lexer::Quoting;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use log::debug;
use std::env;
use std::fs;
use std::io::{self, Write};

/// Names answered by the shell itself; these are never looked up in `PATH`.
pub const BUILTINS: [&str; 5] = ["exit", "echo", "type", "cd", "pwd"];

/// Built-in commands known to the shell at compile time.
///
/// Builtins are created from the parsed [`CommandLine`] and executed directly
/// in-process without spawning a child process. Those without operands parse
/// their arguments with the [`argh`] crate via [`parse_args`]; builtins that take
/// paths or names read the words as they are, so `help` or `-x` stay operands.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Builds the command from the line that invoked it.
    ///
    /// `Err` carries usage or help text that is printed instead of running the command.
    fn parse(line: &CommandLine) -> Result<Self, EarlyExit>;

    /// Executes the command using the provided output stream and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// Parses the words after the command name with `argh`.
fn parse_args<T: FromArgs>(line: &CommandLine) -> Result<T, EarlyExit> {
    let name = line.name().unwrap_or_default();
    T::from_args(&[name], &line.args())
}

/// Usage failure reported like an `argh` error: printed, status 1.
fn usage_error(output: String) -> EarlyExit {
    EarlyExit {
        output,
        status: Err(()),
    }
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, &mut stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                debug!("{} failed: {:#}", T::name(), e);
                writeln!(stdout, "{:#}", e)?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        mut stdout: Box<dyn Stdout>,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        if !self.output.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        line: &CommandLine,
    ) -> Option<Box<dyn ExecutableCommand>> {
        if line.name()? != T::name() {
            return None;
        }
        Some(match T::parse(line) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

/// Text of an I/O error without the trailing `(os error N)`.
fn describe(err: &io::Error) -> String {
    let text = err.to_string();
    match text.find(" (os error") {
        Some(idx) => text[..idx].to_owned(),
        None => text,
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(line: &CommandLine) -> Result<Self, EarlyExit> {
        parse_args(line)
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let cwd = env::current_dir().context("pwd")?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// Without a target, or with `~`, changes to the directory named by HOME.
/// Words after the first are ignored.
pub struct Cd {
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(line: &CommandLine) -> Result<Self, EarlyExit> {
        Ok(Cd {
            target: line.args().first().map(|t| t.to_string()),
        })
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            None | Some("~") => match env.get_var("HOME") {
                Some(home) => home.to_owned(),
                None => bail!("cd: HOME not set"),
            },
            Some(t) => t.to_owned(),
        };

        let new_dir = env.current_dir.join(&target);
        match fs::metadata(&new_dir) {
            Ok(meta) if meta.is_dir() && !target.is_empty() => {}
            Ok(_) => bail!("cd: {}: No such file or directory", target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                bail!("cd: {}: No such file or directory", target)
            }
            Err(e) => bail!("cd: {}: {}", target, describe(&e)),
        }

        let canonical = fs::canonicalize(&new_dir)
            .map_err(|e| anyhow::anyhow!("cd: {}: {}", target, describe(&e)))?;
        env::set_current_dir(&canonical)
            .map_err(|e| anyhow::anyhow!("cd: {}: {}", target, describe(&e)))?;
        debug!("cwd is now {}", canonical.display());
        env.current_dir = canonical;
        Ok(0)
    }
}

/// Exit the shell with a status between 0 and 255, 0 by default.
pub struct Exit {
    pub code: u8,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn parse(line: &CommandLine) -> Result<Self, EarlyExit> {
        let Some(arg) = line.args().first().copied() else {
            return Ok(Exit { code: 0 });
        };
        match arg.parse::<i64>() {
            Ok(n) => u8::try_from(n)
                .map(|code| Exit { code })
                .map_err(|_| usage_error(format!("exit: {}: status out of range 0-255", arg))),
            Err(_) => Err(usage_error(format!("exit: {}: numeric argument required", arg))),
        }
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let code = ExitCode::from(self.code);
        env.request_exit(code);
        Ok(code)
    }
}

/// Write the text following the command name to standard output.
///
/// The text is taken from the raw line rather than from the words: leading blanks
/// are skipped, one pair of quotes is removed when it wraps the whole text, and
/// every run of spaces is printed as a single space.
pub struct Echo {
    pub text: String,
}

impl Echo {
    fn render(rest: &str, quoting: Quoting) -> String {
        let text = rest.trim_start_matches([' ', '\t']);
        collapse_spaces(strip_outer_quotes(text, quoting))
    }
}

fn strip_outer_quotes(text: &str, quoting: Quoting) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && quoting.is_quote(open) => {
            &text[1..text.len() - 1]
        }
        _ => text,
    }
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut space_seen = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !space_seen {
                out.push(' ');
            }
            space_seen = true;
        } else {
            out.push(ch);
            space_seen = false;
        }
    }
    out
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn parse(line: &CommandLine) -> Result<Self, EarlyExit> {
        Ok(Echo {
            text: Echo::render(line.rest(), line.quoting()),
        })
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.text)?;
        Ok(0)
    }
}

/// Tell how each name would be interpreted if used as a command.
pub struct Type {
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn parse(line: &CommandLine) -> Result<Self, EarlyExit> {
        Ok(Type {
            names: line.args().into_iter().map(str::to_owned).collect(),
        })
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.names.is_empty() {
            bail!("type: missing argument");
        }

        let mut status = 0;
        for name in &self.names {
            if BUILTINS.contains(&name.as_str()) {
                writeln!(stdout, "{} is a shell builtin", name)?;
            } else if let Some(path) = resolve(env, name) {
                writeln!(stdout, "{} is {}", name, path.display())?;
            } else {
                writeln!(stdout, "{}: not found", name)?;
                status = 1;
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::MemWriter;
    use std::env as stdenv;
    use std::fs::File;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn empty_env() -> Environment {
        Environment::with_vars(Vec::<(String, String)>::new())
    }

    fn make_unique_temp_dir() -> io::Result<PathBuf> {
        let mut p = stdenv::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("tinysh_test_cd_{}_{}", std::process::id(), nanos));
        fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn line(text: &str) -> CommandLine {
        CommandLine::parse(text, Quoting::SingleOnly)
    }

    /// Creates the command through its factory and runs it, returning status and output.
    fn run<T: BuiltinCommand + 'static>(text: &str, env: &mut Environment) -> (ExitCode, String) {
        let cmd = Factory::<T>::default()
            .try_create(env, &line(text))
            .expect("factory should accept its own name");
        let (out, handle) = MemWriter::with_handle();
        let code = cmd.execute(Box::new(out), env).unwrap();
        let text = String::from_utf8(handle.borrow().clone()).unwrap();
        (code, text)
    }

    #[test]
    fn test_factory_ignores_other_names() {
        let env = empty_env();
        assert!(Factory::<Echo>::default()
            .try_create(&env, &line("echoo hi"))
            .is_none());
        assert!(Factory::<Pwd>::default()
            .try_create(&env, &line("   "))
            .is_none());
    }

    #[test]
    fn test_builtin_table_matches_commands() {
        let names = [
            Exit::name(),
            Echo::name(),
            Type::name(),
            Cd::name(),
            Pwd::name(),
        ];
        assert_eq!(names, BUILTINS);
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let _lock = lock_current_dir();
        let cur = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let (code, out) = run::<Pwd>("pwd", &mut env);

        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", cur.display()));
    }

    #[test]
    fn test_pwd_rejects_arguments() {
        let mut env = empty_env();
        let (code, out) = run::<Pwd>("pwd extra", &mut env);
        assert_eq!(code, 1);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_echo_collapses_spaces() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo hello    world", &mut env).1, "hello world\n");
        assert_eq!(run::<Echo>("echo    spaced   out", &mut env).1, "spaced out\n");
    }

    #[test]
    fn test_echo_strips_whole_quotes_then_collapses() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo 'hello    world'", &mut env).1, "hello world\n");
    }

    #[test]
    fn test_echo_keeps_inner_quotes_when_not_wrapping() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo 'a' 'b'", &mut env).1, "a' 'b\n");
        assert_eq!(run::<Echo>("echo a   'b'", &mut env).1, "a 'b'\n");
    }

    #[test]
    fn test_echo_with_unmatched_apostrophe() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo it's fine", &mut env).1, "it's fine\n");
        assert_eq!(run::<Echo>("echo don't   'stop", &mut env).1, "don't 'stop\n");
        assert_eq!(run::<Echo>("echo '", &mut env).1, "'\n");
    }

    #[test]
    fn test_echo_without_text_prints_newline() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo", &mut env).1, "\n");
        assert_eq!(run::<Echo>("echo   ", &mut env).1, "\n");
    }

    #[test]
    fn test_echo_double_quotes_follow_quoting_mode() {
        let rest = "  \"a   b\"";
        assert_eq!(Echo::render(rest, Quoting::SingleOnly), "\"a b\"");
        assert_eq!(Echo::render(rest, Quoting::SingleAndDouble), "a b");
    }

    #[test]
    fn test_echo_does_not_treat_flags_specially() {
        let mut env = empty_env();
        assert_eq!(run::<Echo>("echo --help", &mut env).1, "--help\n");
    }

    #[test]
    fn test_type_reports_builtins() {
        let mut env = empty_env();
        for name in BUILTINS {
            let (code, out) = run::<Type>(&format!("type {}", name), &mut env);
            assert_eq!(code, 0);
            assert_eq!(out, format!("{} is a shell builtin\n", name));
        }
    }

    #[test]
    fn test_type_reports_path_and_not_found() {
        let dir = make_unique_temp_dir().unwrap();
        File::create(dir.join("mytool")).unwrap();

        let mut env = Environment::with_vars([("PATH", dir.display().to_string())]);
        let (code, out) = run::<Type>("type mytool", &mut env);
        assert_eq!(code, 0);
        assert_eq!(out, format!("mytool is {}/mytool\n", dir.display()));

        let (code, out) = run::<Type>("type nosuchtool_xyz", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "nosuchtool_xyz: not found\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_type_with_empty_path() {
        let mut env = Environment::with_vars([("PATH", "")]);
        let (code, out) = run::<Type>("type ls", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "ls: not found\n");
    }

    #[test]
    fn test_type_takes_flag_like_names_literally() {
        let mut env = Environment::with_vars([("PATH", "")]);
        for name in ["help", "-x", "--help", "--"] {
            let (code, out) = run::<Type>(&format!("type {}", name), &mut env);
            assert_eq!(code, 1);
            assert_eq!(out, format!("{}: not found\n", name));
        }
    }

    #[test]
    fn test_type_missing_argument() {
        let mut env = empty_env();
        let (code, out) = run::<Type>("type", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "type: missing argument\n");
    }

    #[test]
    fn test_exit_requests_termination() {
        let mut env = empty_env();
        let (code, _) = run::<Exit>("exit", &mut env);
        assert_eq!(code, 0);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, 0);

        let mut env = empty_env();
        run::<Exit>("exit 0", &mut env);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, 0);

        let mut env = empty_env();
        run::<Exit>("exit 4", &mut env);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, 4);
    }

    #[test]
    fn test_exit_with_bad_code_keeps_running() {
        let mut env = empty_env();
        let (code, out) = run::<Exit>("exit soon", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "exit: soon: numeric argument required\n");
        assert!(!env.should_exit);

        let (code, out) = run::<Exit>("exit --help", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "exit: --help: numeric argument required\n");
        assert!(!env.should_exit);
    }

    #[test]
    fn test_exit_code_must_fit_a_byte() {
        let mut env = empty_env();
        run::<Exit>("exit 255", &mut env);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, 255);

        for text in ["exit 256", "exit -1"] {
            let mut env = empty_env();
            let (code, out) = run::<Exit>(text, &mut env);
            assert_eq!(code, 1);
            assert!(out.ends_with(": status out of range 0-255\n"), "{}", out);
            assert!(!env.should_exit);
        }
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");

        // save original cwd to restore later
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let (code, out) = run::<Cd>(&format!("cd {}", canonical_temp.display()), &mut env);

        assert_eq!(code, 0);
        assert_eq!(out, "");

        let new_cwd = stdenv::current_dir().unwrap();
        let new_canonical = fs::canonicalize(&new_cwd).unwrap();

        assert_eq!(new_canonical, canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_relative_to_tracked_dir() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().unwrap();
        fs::create_dir(temp.join("child")).unwrap();
        let canonical_child = fs::canonicalize(temp.join("child")).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        env.current_dir = temp.clone();
        let (code, _) = run::<Cd>("cd child", &mut env);
        assert_eq!(code, 0);
        assert_eq!(env.current_dir, canonical_child);
        assert_eq!(fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(), canonical_child);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_into_dirs_named_like_flags() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().unwrap();
        let orig = stdenv::current_dir().unwrap();

        for name in ["help", "-dash", "--help"] {
            fs::create_dir(temp.join(name)).unwrap();
            let expected = fs::canonicalize(temp.join(name)).unwrap();

            let mut env = empty_env();
            env.current_dir = temp.clone();
            let (code, out) = run::<Cd>(&format!("cd {}", name), &mut env);
            assert_eq!(code, 0, "cd {} printed {:?}", name, out);
            assert_eq!(out, "");
            assert_eq!(env.current_dir, expected);
            assert_eq!(fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(), expected);
        }

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_dash_is_just_a_missing_dir() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        env.current_dir = temp.clone();
        let (code, out) = run::<Cd>("cd -", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "cd: -: No such file or directory\n");
        assert_eq!(env.current_dir, temp);
        assert_eq!(stdenv::current_dir().unwrap(), orig);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_to_home_when_none_or_tilde() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");

        let orig = stdenv::current_dir().unwrap();

        for text in ["cd", "cd ~"] {
            let mut env = empty_env();
            env.set_var("HOME", canonical_temp.display().to_string());
            let (code, _) = run::<Cd>(text, &mut env);
            assert_eq!(code, 0);
            assert_eq!(env.current_dir, canonical_temp);
            stdenv::set_current_dir(&orig).expect("failed to restore cwd");
        }

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_without_home() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let (code, out) = run::<Cd>("cd", &mut env);
        assert_eq!(code, 1);
        assert_eq!(out, "cd: HOME not set\n");
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let name = format!("nonexistent_dir_for_tinysh_test_{}", std::process::id());
        let (code, out) = run::<Cd>(&format!("cd {}", name), &mut env);

        assert_eq!(code, 1);
        assert_eq!(out, format!("cd: {}: No such file or directory\n", name));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_to_file_errors() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().unwrap();
        let file = temp.join("plain");
        File::create(&file).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let (code, out) = run::<Cd>(&format!("cd {}", file.display()), &mut env);
        assert_eq!(code, 1);
        assert_eq!(
            out,
            format!("cd: {}: No such file or directory\n", file.display())
        );
        assert_eq!(stdenv::current_dir().unwrap(), orig);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_describe_strips_os_error_suffix() {
        let err = io::Error::from_raw_os_error(2);
        assert!(!describe(&err).contains("os error"));
    }
}
