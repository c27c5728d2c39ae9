use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::cmd::{self, CmdOutput};
use crate::error::{DeployError, DeployResult};
use crate::target::{Credential, VpsTarget};

const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Credentialed remote command execution and file transfer.
///
/// One fresh session per call, no connection pooling; implementations
/// must clean up every local temporary artifact they create before
/// returning, on success and failure alike.
pub trait RemoteExecutor {
    /// Run a shell command on the target, capturing output. A
    /// non-zero exit code is returned as data, not as an error.
    fn run_command(&self, command: &str, timeout: Duration) -> DeployResult<CmdOutput>;

    /// Materialize `content` at `remote_path` on the target.
    fn transfer_file(&self, content: &str, remote_path: &str) -> DeployResult<()>;

    /// Archive `local_dir` into one compressed bundle, ship it, and
    /// unpack it into `remote_dir` on the target. Batches what would
    /// otherwise be many small transfers into one round trip.
    fn transfer_directory(&self, local_dir: &Path, remote_dir: &str) -> DeployResult<()>;
}

/// SSH-backed [`RemoteExecutor`] shelling out to `ssh`/`scp`.
///
/// When the target carries a pinned host key, every session verifies
/// the host against it and fails closed on mismatch. Without a pin,
/// verification is disabled (`StrictHostKeyChecking=no`, throwaway
/// known-hosts file): the target is a freshly provisioned host the
/// operator just registered, and there is no fingerprint to pin yet.
/// That mode trades first-contact man-in-the-middle protection for
/// operability and is flagged with a warning at session creation.
///
/// Private keys are written to a uniquely named temporary file with
/// owner-only permissions immediately before each call and removed
/// when the call returns, on every exit path. Passwords are handed to
/// `sshpass` through the child environment, never on the command
/// line.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    host_key: Option<String>,
    credential: Credential,
    transfer_timeout: Duration,
}

impl SshSession {
    #[must_use]
    pub fn new(target: &VpsTarget, credential: Credential) -> Self {
        if target.host_key.is_none() {
            warn!(
                host = %target.host,
                "no pinned host key, trusting the host on first contact"
            );
        }
        Self {
            host: target.host.clone(),
            user: target.username.clone(),
            port: target.port,
            host_key: target.host_key.clone(),
            credential,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Write the private key to a temp file for `ssh -i`. The file is
    /// created with owner-only permissions and removed on drop.
    fn write_key_file(&self) -> DeployResult<Option<NamedTempFile>> {
        let Credential::PrivateKey(key) = &self.credential else {
            return Ok(None);
        };

        let mut file = tempfile::Builder::new()
            .prefix("estivador-key-")
            .tempfile()?;
        file.write_all(key.as_bytes())?;
        if !key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(Some(file))
    }

    /// Write a one-line `known_hosts` file for the pinned host key.
    fn write_known_hosts(&self) -> DeployResult<Option<NamedTempFile>> {
        let Some(key) = &self.host_key else {
            return Ok(None);
        };

        let entry = if self.port == 22 {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        };
        let mut file = tempfile::Builder::new()
            .prefix("estivador-hosts-")
            .tempfile()?;
        writeln!(file, "{entry} {key}")?;
        file.flush()?;
        Ok(Some(file))
    }

    fn base_args(
        &self,
        port_flag: &str,
        key_file: Option<&NamedTempFile>,
        known_hosts: Option<&NamedTempFile>,
    ) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(hosts) = known_hosts {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=yes".to_string());
            args.push("-o".to_string());
            args.push(format!("UserKnownHostsFile={}", hosts.path().display()));
        } else {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
            args.push("-o".to_string());
            args.push("UserKnownHostsFile=/dev/null".to_string());
        }
        args.push("-o".to_string());
        args.push("ConnectTimeout=10".to_string());
        args.push(port_flag.to_string());
        args.push(self.port.to_string());
        if let Some(file) = key_file {
            args.push("-i".to_string());
            args.push(file.path().display().to_string());
        }
        args
    }

    /// Spawn `ssh` or `scp` with the right authentication plumbing.
    fn invoke(&self, program: &str, args: &[String], timeout: Duration) -> DeployResult<CmdOutput> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();

        match &self.credential {
            Credential::Password(password) => {
                if cmd::command_exists("sshpass") {
                    let mut full = vec!["-e", program];
                    full.extend(&refs);
                    cmd::run_with_env("sshpass", &full, &[("SSHPASS", password)], timeout)
                } else {
                    warn!(
                        host = %self.host,
                        "sshpass not found; password authentication will likely fail, \
                         prefer a private key"
                    );
                    cmd::run(program, &refs, timeout)
                }
            }
            Credential::PrivateKey(_) => cmd::run(program, &refs, timeout),
        }
    }

    fn scp_path(&self, local: &Path, remote_path: &str) -> DeployResult<()> {
        let key_file = self.write_key_file()?;
        let known_hosts = self.write_known_hosts()?;
        let mut args = self.base_args("-P", key_file.as_ref(), known_hosts.as_ref());
        args.push(local.display().to_string());
        args.push(format!("{}:{remote_path}", self.destination()));

        let out = self.invoke("scp", &args, self.transfer_timeout)?;
        if out.success() {
            Ok(())
        } else {
            Err(DeployError::TransferFailed {
                remote_path: remote_path.to_string(),
                detail: out.stderr.trim().to_string(),
            })
        }
    }
}

impl RemoteExecutor for SshSession {
    fn run_command(&self, command: &str, timeout: Duration) -> DeployResult<CmdOutput> {
        let key_file = self.write_key_file()?;
        let known_hosts = self.write_known_hosts()?;
        let mut args = self.base_args("-p", key_file.as_ref(), known_hosts.as_ref());
        args.push(self.destination());
        args.push(command.to_string());
        self.invoke("ssh", &args, timeout)
        // key_file drops here, removing the on-disk key.
    }

    fn transfer_file(&self, content: &str, remote_path: &str) -> DeployResult<()> {
        let mut local = tempfile::Builder::new()
            .prefix("estivador-file-")
            .tempfile()?;
        local.write_all(content.as_bytes())?;
        local.flush()?;
        self.scp_path(local.path(), remote_path)
    }

    fn transfer_directory(&self, local_dir: &Path, remote_dir: &str) -> DeployResult<()> {
        if !local_dir.is_dir() {
            return Err(DeployError::TransferFailed {
                remote_path: remote_dir.to_string(),
                detail: format!("local directory not found: {}", local_dir.display()),
            });
        }

        let bundle = tempfile::Builder::new()
            .prefix("estivador-bundle-")
            .suffix(".tar.gz")
            .tempfile()?;
        let bundle_path = bundle.path().display().to_string();

        let tar = cmd::run(
            "tar",
            &["-czf", &bundle_path, "-C", &local_dir.display().to_string(), "."],
            self.transfer_timeout,
        )?;
        if !tar.success() {
            return Err(DeployError::TransferFailed {
                remote_path: remote_dir.to_string(),
                detail: format!("tar failed: {}", tar.stderr.trim()),
            });
        }

        let remote_bundle = format!("{remote_dir}.tar.gz");
        self.scp_path(bundle.path(), &remote_bundle)?;

        let unpack = self.run_command(
            &format!(
                "mkdir -p {remote_dir} && tar -xzf {remote_bundle} -C {remote_dir} && \
                 rm {remote_bundle}"
            ),
            self.transfer_timeout,
        )?;
        if unpack.success() {
            Ok(())
        } else {
            Err(DeployError::TransferFailed {
                remote_path: remote_dir.to_string(),
                detail: unpack.stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AuthMode;

    fn session(credential: Credential) -> SshSession {
        let target = VpsTarget {
            id: "t1".into(),
            host: "203.0.113.9".into(),
            username: "deploy".into(),
            port: 2222,
            auth_mode: AuthMode::PrivateKey,
            encrypted_password: None,
            encrypted_private_key: Some("unused".into()),
            host_key: None,
        };
        SshSession::new(&target, credential)
    }

    #[test]
    fn ssh_args_carry_port_and_host_key_policy() {
        let s = session(Credential::Password("pw".into()));
        let args = s.base_args("-p", None, None);

        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        let port_at = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[port_at + 1], "2222");
        assert_eq!(s.destination(), "deploy@203.0.113.9");
    }

    #[test]
    fn pinned_host_key_enables_strict_checking() {
        let mut s = session(Credential::Password("pw".into()));
        s.host_key = Some("ssh-ed25519 AAAATESTKEY".to_string());

        let hosts = s.write_known_hosts().unwrap().unwrap();
        let line = std::fs::read_to_string(hosts.path()).unwrap();
        assert_eq!(line, "[203.0.113.9]:2222 ssh-ed25519 AAAATESTKEY\n");

        let args = s.base_args("-p", None, Some(&hosts));
        assert!(args.contains(&"StrictHostKeyChecking=yes".to_string()));
        assert!(
            args.iter()
                .any(|a| a.starts_with("UserKnownHostsFile=") && a.contains("estivador-hosts-"))
        );
        assert!(!args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
    }

    #[test]
    fn key_file_is_owner_only_and_removed_on_drop() {
        use std::os::unix::fs::PermissionsExt;

        let s = session(Credential::PrivateKey("-----BEGIN KEY-----".into()));
        let file = s.write_key_file().unwrap().unwrap();
        let path = file.path().to_path_buf();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "-----BEGIN KEY-----\n");

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn no_key_file_for_password_auth() {
        let s = session(Credential::Password("pw".into()));
        assert!(s.write_key_file().unwrap().is_none());
    }

    #[test]
    fn missing_local_directory_is_an_error() {
        let s = session(Credential::Password("pw".into()));
        let err = s
            .transfer_directory(Path::new("/nonexistent/source"), "/opt/app")
            .unwrap_err();
        assert!(matches!(err, DeployError::TransferFailed { .. }));
    }
}
