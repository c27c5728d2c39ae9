use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DeployError, DeployResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished subprocess. A non-zero exit code is
/// data here, not an error; callers decide what is fatal.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command, capturing output, enforcing `timeout`.
pub fn run(program: &str, args: &[&str], timeout: Duration) -> DeployResult<CmdOutput> {
    run_with_env(program, args, &[], timeout)
}

/// Run a command with extra environment variables set for the child
/// only. Used to hand secrets to helpers (e.g. `SSHPASS`) without
/// putting them on the command line.
///
/// On timeout the child is killed and reaped, never left running.
pub fn run_with_env(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> DeployResult<CmdOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeployError::CommandNotFound(program.to_string())
        } else {
            DeployError::Io(e)
        }
    })?;

    // Drain the pipes on their own threads so a chatty child cannot
    // deadlock against a full pipe buffer while we poll for exit.
    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");
    let out_reader = thread::spawn(move || read_all(stdout));
    let err_reader = thread::spawn(move || read_all(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DeployError::CommandTimeout {
                command: format_command(program, args),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CmdOutput {
        stdout: out_reader.join().unwrap_or_default(),
        stderr: err_reader.join().unwrap_or_default(),
        exit_code: status.code().unwrap_or(-1),
    })
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn read_all(mut source: impl Read) -> String {
    let mut buf = String::new();
    let _ = source.read_to_string(&mut buf);
    buf
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let out = run("sh", &["-c", "echo hi; echo err >&2; exit 3"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[test]
    fn timeout_kills_the_child() {
        let err = run("sleep", &["30"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, DeployError::CommandTimeout { .. }));
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = run("definitely-not-a-real-binary", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DeployError::CommandNotFound(_)));
    }

    #[test]
    fn child_env_is_passed() {
        let out = run_with_env(
            "sh",
            &["-c", "printf %s \"$PROBE\""],
            &[("PROBE", "value")],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.stdout, "value");
    }
}
