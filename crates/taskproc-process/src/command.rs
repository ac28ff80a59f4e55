use std::collections::BTreeMap;
use std::ffi::OsString;

use camino::Utf8PathBuf;

/// A process invocation, built fluently and converted into a
/// `tokio::process::Command` at spawn time. Mirrors
/// `turborepo-lib/src/process/command.rs`'s `Command` builder.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<Utf8PathBuf>,
    env: BTreeMap<String, String>,
    env_clear: bool,
    open_stdin: bool,
    label: Option<String>,
}

impl Command {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            env_clear: false,
            open_stdin: false,
            label: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.cwd = Some(dir);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    pub fn open_stdin(mut self) -> Self {
        self.open_stdin = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn will_open_stdin(&self) -> bool {
        self.open_stdin
    }

    pub fn label_or_program(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }
}

impl From<Command> for tokio::process::Command {
    fn from(command: Command) -> Self {
        let mut tokio_command = tokio::process::Command::new(&command.program);
        tokio_command.args(&command.args);

        if let Some(cwd) = &command.cwd {
            tokio_command.current_dir(cwd.as_std_path());
        }

        if command.env_clear {
            tokio_command.env_clear();
        }
        tokio_command.envs(command.env.iter());

        tokio_command.stdout(std::process::Stdio::piped());
        tokio_command.stderr(std::process::Stdio::piped());
        if command.open_stdin {
            tokio_command.stdin(std::process::Stdio::piped());
        } else {
            tokio_command.stdin(std::process::Stdio::null());
        }

        tokio_command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_program_name() {
        let cmd = Command::new("bash").args(["-c", "echo hi"]);
        assert_eq!(cmd.label_or_program(), "bash");
        let labeled = cmd.label("task-7");
        assert_eq!(labeled.label_or_program(), "task-7");
    }
}
