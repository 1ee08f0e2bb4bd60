// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Execution of the `one*` command line tools.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use slog::{debug, Logger};

use crate::Error;

/// What a command reads on stdin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Input {
    Null,
    /// A single newline, accepting the default of any prompt.
    Enter,
}

/// Renders a command line for logs and errors.
pub(crate) fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `program` to completion and returns its stdout.
///
/// A non-zero exit is an error carrying the command line, the exit status
/// and both output streams.
pub(crate) fn run(
    log: &Logger,
    program: &str,
    args: &[String],
    input: Input,
) -> Result<String, Error> {
    let command = render(program, args);
    debug!(log, "Running command"; "command" => &command, "input" => ?input);

    let spawn_err = |source| Error::Spawn { command: command.clone(), source };
    let mut child = Command::new(program)
        .args(args)
        .stdin(match input {
            Input::Null => Stdio::null(),
            Input::Enter => Stdio::piped(),
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if input == Input::Enter {
        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit without reading its input; its exit status
            // decides the outcome.
            match stdin.write_all(b"\n") {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    return Err(spawn_err(e));
                }
                _ => {}
            }
        }
    }

    let output = child.wait_with_output().map_err(spawn_err)?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(Error::Failed {
            command,
            status: output.status,
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    debug!(log, "Command succeeded"; "command" => &command, "stdout_len" => stdout.len());
    Ok(stdout)
}

/// Runs `program --version`, only checking that it can be executed.
pub(crate) fn probe(log: &Logger, program: &str) -> Result<(), Error> {
    let status = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| Error::Spawn {
            command: format!("{} --version", program),
            source,
        })?;
    debug!(log, "Command found"; "command" => program, "status" => %status);
    Ok(())
}
