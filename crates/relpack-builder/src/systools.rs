use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::differ::{DifferCall, DifferError, ReleaseDiffer};

/// Drives `systools` inside a non-interactive Erlang runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErlSystools {
    erl: PathBuf,
}

impl Default for ErlSystools {
    fn default() -> Self {
        Self::new("erl")
    }
}

impl ErlSystools {
    pub fn new(erl: impl Into<PathBuf>) -> Self {
        Self { erl: erl.into() }
    }

    pub fn erl(&self) -> &Path {
        &self.erl
    }

    pub(crate) fn invoke_with_runner<RunCommand>(
        &self,
        call: &DifferCall<'_>,
        expression: &str,
        mut run: RunCommand,
    ) -> Result<(), DifferError>
    where
        RunCommand: FnMut(&mut Command) -> Result<(), DifferError>,
    {
        let mut command = build_systools_command(&self.erl, call, expression);
        debug!(command = ?command, "running systools");
        run(&mut command)
    }
}

impl ReleaseDiffer for ErlSystools {
    fn make_relup(
        &self,
        call: &DifferCall<'_>,
        up_from: &[String],
        down_to: &[String],
    ) -> Result<(), DifferError> {
        let expression = relup_expression(call.release, up_from, down_to);
        self.invoke_with_runner(call, &expression, run_command)
    }

    fn make_script(&self, call: &DifferCall<'_>) -> Result<(), DifferError> {
        let expression = script_expression(call.release);
        self.invoke_with_runner(call, &expression, run_command)
    }

    fn make_tar(&self, call: &DifferCall<'_>) -> Result<(), DifferError> {
        let expression = tar_expression(call.release);
        self.invoke_with_runner(call, &expression, run_command)
    }
}

pub(crate) fn build_systools_command(erl: &Path, call: &DifferCall<'_>, expression: &str) -> Command {
    let mut command = Command::new(erl);
    command
        .current_dir(call.work_dir)
        .arg("-noshell")
        .arg("-noinput");
    for entry in call.search.entries() {
        command.arg("-pa").arg(entry);
    }
    command.arg("-eval").arg(expression);
    command
}

pub(crate) fn relup_expression(release: &str, up_from: &[String], down_to: &[String]) -> String {
    systools_eval(&format!(
        "systools:make_relup({}, {}, {}, [silent])",
        erl_string(release),
        erl_string_list(up_from),
        erl_string_list(down_to)
    ))
}

pub(crate) fn script_expression(release: &str) -> String {
    systools_eval(&format!(
        "systools:make_script({}, [silent])",
        erl_string(release)
    ))
}

pub(crate) fn tar_expression(release: &str) -> String {
    systools_eval(&format!(
        "systools:make_tar({}, [silent])",
        erl_string(release)
    ))
}

// Exit status carries success; the formatted reason goes to stderr.
fn systools_eval(call: &str) -> String {
    format!(
        "case {call} of \
         error -> halt(1); \
         {{error, Mod, Reason}} -> io:format(standard_error, \"~ts~n\", [Mod:format_error(Reason)]), halt(1); \
         _ -> halt(0) \
         end."
    )
}

fn erl_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn erl_string_list(values: &[String]) -> String {
    let items = values
        .iter()
        .map(|value| erl_string(value))
        .collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}

pub(crate) fn run_command(command: &mut Command) -> Result<(), DifferError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command.output().map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            return DifferError::new(
                "spawn",
                format!(
                    "required Erlang runtime '{program}' was not found on PATH; install Erlang/OTP or set `erl` in relpack.toml"
                ),
            );
        }
        DifferError::new("spawn", format!("failed to start '{program}': {err}"))
    })?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reason = match (stderr.trim(), stdout.trim()) {
        ("", "") => format!("'{program}' exited with {}", output.status),
        ("", stdout) => stdout.to_string(),
        (stderr, _) => stderr.to_string(),
    };
    Err(DifferError::new("error", reason))
}
