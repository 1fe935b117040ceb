use crate::command::{CommandFactory, CommandLine, ExecutableCommand, ExitCode, Stdout};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use anyhow::Result;
use log::debug;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    path: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    /// `name` becomes the child's `argv[0]`; `path` is what actually gets executed.
    pub fn new(name: String, path: PathBuf, args: Vec<String>) -> Self {
        Self { name, path, args }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        line: &CommandLine,
    ) -> Option<Box<dyn ExecutableCommand>> {
        let name = line.name()?;
        let path = resolve(env, name)?;
        Some(Box::new(ExternalCommand::new(
            name.to_owned(),
            path,
            line.args().into_iter().map(str::to_owned).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        stdout.flush()?;

        let mut command = std::process::Command::new(&self.path);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.arg0(&self.name);
        }
        command
            .args(&self.args)
            .stdout(stdout.stdio())
            .env_clear()
            .envs(env.vars.iter())
            .current_dir(&env.current_dir);

        debug!(
            "spawning {} as {:?} with {} args",
            self.path.display(),
            self.name,
            self.args.len()
        );
        let spawn_error = |source| ShellError::Spawn {
            name: self.name.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_error)?;
        let exit_status = child.wait().map_err(spawn_error)?;

        let code = match exit_status.code() {
            Some(x) => x,
            None => terminated_by_signal(exit_status),
        };
        debug!("{} exited with {}", self.name, code);
        Ok(code)
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command name to the file that should be executed.
///
/// Behavior:
/// - Name containing `/`: taken as a path (relative ones against the tracked
///   current directory) and returned if it exists. `PATH` is not consulted.
/// - Bare name: `PATH` is split on `:` and each directory is listed in order;
///   the first entry whose file name equals `name` wins and `dir/name` is returned.
///   Directories that cannot be listed are skipped.
/// - `PATH` unset or empty name: `None`.
///
/// Entries are matched by name only. Whether the match is an executable regular
/// file is left for the spawn to find out.
pub fn resolve(env: &Environment, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let path = env.current_dir.join(name);
        return path.exists().then_some(path);
    }

    let search_paths = env.get_var("PATH")?;
    find_in_path(search_paths, name)
}

fn find_in_path(search_paths: &str, name: &str) -> Option<PathBuf> {
    for dir in search_paths.split(':') {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("skipping PATH entry {:?}: {}", dir, err);
                continue;
            }
        };
        let found = entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name() == OsStr::new(name));
        if found {
            return Some(PathBuf::from(format!("{}/{}", dir, name)));
        }
    }
    None
}
