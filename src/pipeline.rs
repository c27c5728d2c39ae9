use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cmd::CmdOutput;
use crate::compose;
use crate::envfile;
use crate::error::{DeployError, DeployResult};
use crate::secret::SecretCodec;
use crate::ssh::{RemoteExecutor, SshSession};
use crate::store::{DeployStatus, RecordPatch, RecordStore, TargetStore};
use crate::target::{AuthMode, Credential, VpsTarget, extract_domain_from_host};
use crate::vars;

const DEFAULT_DEPLOY_DIR: &str = "/opt/postiz-platform";
const DEFAULT_ORCHESTRATOR_SOURCE: &str = "./deploy/content-orchestrator";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BRING_UP_TIMEOUT: Duration = Duration::from_secs(300);

/// One deployment request from the external API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub vps_target_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

/// Externally reachable endpoints of the deployed stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployUrls {
    pub postiz_url: String,
    pub orchestrator_url: String,
    pub deploy_dir: String,
}

/// Success payload returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub message: String,
    pub deployment_id: String,
    pub status: DeployStatus,
    pub urls: DeployUrls,
    pub services_status: String,
}

/// Factory producing one fresh [`RemoteExecutor`] per run. Swappable
/// so tests can script remote behavior without a network.
pub type Connector = dyn Fn(&VpsTarget, Credential) -> Box<dyn RemoteExecutor>;

/// Deployment pipeline: resolves a stored VPS target, decrypts its
/// credentials, renders the stack artifacts, and drives the remote
/// bring-up while persisting a [`DeploymentRecord`] through each
/// state transition.
///
/// Each call to [`deploy`](Self::deploy) is one independent linear
/// run: `pending → running → completed | failed`, terminal exactly
/// once. Re-running against the same target is safe — directory
/// creation tolerates pre-existence, transfers overwrite, and the
/// compose bring-up recreates only what changed. Abandoning the
/// caller does not stop in-flight remote commands; cancellation is
/// best effort, not guaranteed.
///
/// [`DeploymentRecord`]: crate::store::DeploymentRecord
pub struct Pipeline {
    codec: SecretCodec,
    targets: Box<dyn TargetStore>,
    records: Box<dyn RecordStore>,
    connect: Box<Connector>,
    deploy_dir: String,
    orchestrator_source: PathBuf,
    command_timeout: Duration,
    bring_up_timeout: Duration,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        codec: SecretCodec,
        targets: impl TargetStore + 'static,
        records: impl RecordStore + 'static,
    ) -> Self {
        Self {
            codec,
            targets: Box::new(targets),
            records: Box::new(records),
            connect: Box::new(|target, credential| Box::new(SshSession::new(target, credential))),
            deploy_dir: DEFAULT_DEPLOY_DIR.to_string(),
            orchestrator_source: PathBuf::from(DEFAULT_ORCHESTRATOR_SOURCE),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            bring_up_timeout: DEFAULT_BRING_UP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn deploy_dir(mut self, dir: &str) -> Self {
        self.deploy_dir = dir.to_string();
        self
    }

    /// Local source tree of the content-orchestration service.
    #[must_use]
    pub fn orchestrator_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.orchestrator_source = path.into();
        self
    }

    /// Timeout for quick remote filesystem operations.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Timeout for the stack bring-up, which may pull images and
    /// start several containers.
    #[must_use]
    pub const fn bring_up_timeout(mut self, timeout: Duration) -> Self {
        self.bring_up_timeout = timeout;
        self
    }

    /// Replace the session factory (used by tests).
    #[must_use]
    pub fn connector(
        mut self,
        connect: impl Fn(&VpsTarget, Credential) -> Box<dyn RemoteExecutor> + 'static,
    ) -> Self {
        self.connect = Box::new(connect);
        self
    }

    /// Run one full deployment for `request`, scoped to `caller_id`.
    ///
    /// Exactly one terminal outcome per run: `Ok` with the service
    /// URLs, or a single [`DeployError`] after the record has been
    /// marked failed with its log trail intact. Partial progress
    /// stays visible in the persisted log for operator diagnosis.
    pub fn deploy(&self, caller_id: &str, request: &DeployRequest) -> DeployResult<DeployOutcome> {
        let target = self
            .targets
            .get_target(&request.vps_target_id, caller_id)?
            .ok_or_else(|| DeployError::TargetNotFound(request.vps_target_id.clone()))?;
        target.validate()?;

        let record = self
            .records
            .create_record(&target.id, request.workflow_id.as_deref())?;
        info!(deployment_id = %record.id, host = %target.host, "deployment started");

        let mut log = Vec::new();
        match self.run_steps(&target, request, &record.id, &mut log) {
            Ok((urls, services_status)) => {
                log.push("Deploy completed successfully".to_string());
                self.records.update_record(
                    &record.id,
                    RecordPatch::default()
                        .status(DeployStatus::Completed)
                        .logs(log)
                        .completed_at(Utc::now()),
                )?;
                info!(deployment_id = %record.id, "deployment completed");
                Ok(DeployOutcome {
                    message: "Deploy completed successfully".to_string(),
                    deployment_id: record.id,
                    status: DeployStatus::Completed,
                    urls,
                    services_status,
                })
            }
            Err(err) => {
                log.push(format!("error: {err}"));
                // The terminal failure is persisted before the error
                // is surfaced; a store hiccup here must not mask the
                // deployment failure itself.
                if let Err(store_err) = self.records.update_record(
                    &record.id,
                    RecordPatch::default()
                        .status(DeployStatus::Failed)
                        .logs(log)
                        .completed_at(Utc::now()),
                ) {
                    warn!(
                        deployment_id = %record.id,
                        error = %store_err,
                        "failed to persist failure state"
                    );
                }
                Err(err)
            }
        }
    }

    fn run_steps(
        &self,
        target: &VpsTarget,
        request: &DeployRequest,
        deployment_id: &str,
        log: &mut Vec<String>,
    ) -> DeployResult<(DeployUrls, String)> {
        let credential = self.resolve_credential(target, log)?;

        let jwt_secret = vars::generate_secret();
        let defaults = vars::resolve_defaults(&request.variables, &jwt_secret);
        let deploy_dir = self.deploy_dir.clone();
        let orchestrator_dir = format!("{deploy_dir}/{}", compose::ORCHESTRATOR_SUBDIR);

        let descriptor = compose::render(&request.variables, &defaults);
        let root_env = envfile::render_root_env(&request.variables, &defaults);
        let orchestrator_env = envfile::render_orchestrator_env(&request.variables);

        let session = (self.connect)(target, credential);

        // Running begins with the first remote command.
        self.records.update_record(
            deployment_id,
            RecordPatch::default().status(DeployStatus::Running),
        )?;

        log.push(format!("Creating directories on {}", target.host));
        let out = session
            .run_command(
                &format!(
                    "mkdir -p {deploy_dir} {orchestrator_dir} {orchestrator_dir}/downloads \
                     {orchestrator_dir}/logs {orchestrator_dir}/data"
                ),
                self.command_timeout,
            )
            .map_err(|e| fatal("create directories", &e))?;
        if !out.success() && !out.stderr.contains("File exists") {
            return Err(DeployError::StepFailed {
                step: "create directories".to_string(),
                detail: out.stderr.trim().to_string(),
            });
        }

        log.push("Copying docker-compose.yml".to_string());
        session
            .transfer_file(&descriptor, &format!("{deploy_dir}/docker-compose.yml"))
            .map_err(|e| fatal("copy docker-compose.yml", &e))?;

        log.push("Copying .env".to_string());
        session
            .transfer_file(&root_env, &format!("{deploy_dir}/.env"))
            .map_err(|e| fatal("copy .env", &e))?;

        self.transfer_orchestrator_source(session.as_ref(), &deploy_dir, &orchestrator_dir, log);

        log.push("Copying content-orchestrator .env".to_string());
        session
            .transfer_file(&orchestrator_env, &format!("{orchestrator_dir}/.env"))
            .map_err(|e| fatal("copy orchestrator .env", &e))?;

        log.push("Starting services with docker compose".to_string());
        let out = session
            .run_command(
                &format!("cd {deploy_dir} && docker compose up -d --build"),
                self.bring_up_timeout,
            )
            .map_err(|e| fatal("bring-up", &e))?;
        require_success("bring-up", &out)?;

        let out = session
            .run_command(
                &format!("cd {deploy_dir} && docker compose ps"),
                self.command_timeout,
            )
            .map_err(|e| fatal("status check", &e))?;
        require_success("status check", &out)?;
        let services_status = out.stdout;
        log.push(format!("Services status:\n{}", services_status.trim()));

        let domain = request
            .variables
            .get("DOMAIN_NAME")
            .cloned()
            .unwrap_or_else(|| extract_domain_from_host(&target.host));
        let subdomain = request
            .variables
            .get("POSTIZ_SUBDOMAIN")
            .map_or(vars::DEFAULT_POSTIZ_SUBDOMAIN, String::as_str);
        let urls = DeployUrls {
            postiz_url: format!("https://{subdomain}.{domain}"),
            orchestrator_url: request
                .variables
                .get("CONTENT_ORCHESTRATOR_URL")
                .cloned()
                .unwrap_or_else(|| "http://content-orchestrator:8000".to_string()),
            deploy_dir,
        };

        Ok((urls, services_status))
    }

    /// Decrypt the stored credential, tolerating legacy rows that
    /// predate encryption at rest: if decryption fails, the stored
    /// value is used verbatim. A migration shim, not a contract —
    /// flagged with a warning every time it fires.
    fn resolve_credential(
        &self,
        target: &VpsTarget,
        log: &mut Vec<String>,
    ) -> DeployResult<Credential> {
        let stored = target
            .stored_credential()
            .ok_or_else(|| DeployError::InvalidTarget("no stored credential".into()))?;

        let plaintext = match self.codec.decrypt(stored) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target = %target.id,
                    error = %err,
                    "stored credential failed to decrypt, using as plain text"
                );
                log.push("warning: stored credential is not encrypted, using as-is".to_string());
                stored.to_string()
            }
        };

        Ok(match target.auth_mode {
            AuthMode::Password => Credential::Password(plaintext),
            AuthMode::PrivateKey => Credential::PrivateKey(plaintext),
        })
    }

    /// Best-effort transfer of the orchestrator source tree. The
    /// bundle path is preferred; individual file copy is the explicit
    /// fallback. Nothing here fails the deployment — the platform
    /// provisioning code is not essential to a successful bring-up.
    fn transfer_orchestrator_source(
        &self,
        session: &dyn RemoteExecutor,
        deploy_dir: &str,
        orchestrator_dir: &str,
        log: &mut Vec<String>,
    ) {
        let source = &self.orchestrator_source;
        if !source.is_dir() {
            warn!(path = %source.display(), "orchestrator source tree not found, skipping");
            log.push(format!(
                "warning: orchestrator source not found at {}",
                source.display()
            ));
            return;
        }

        log.push("Copying content-orchestrator source".to_string());
        let bundle_dest = format!("{deploy_dir}/content-orchestrator-source");
        match session.transfer_directory(source, &bundle_dest) {
            Ok(()) => log.push("Orchestrator source transferred".to_string()),
            Err(err) => {
                warn!(error = %err, "bundle transfer failed, copying files individually");
                log.push(format!(
                    "warning: bundle transfer failed ({err}), copying files individually"
                ));
                self.transfer_source_files(session, source, orchestrator_dir, log);
            }
        }
    }

    fn transfer_source_files(
        &self,
        session: &dyn RemoteExecutor,
        source: &Path,
        orchestrator_dir: &str,
        log: &mut Vec<String>,
    ) {
        let files = collect_source_files(source);

        // One mkdir covering every parent keeps the fallback down to
        // one round trip per file.
        let mut dirs: Vec<String> = files
            .iter()
            .filter_map(|(rel, _)| {
                Path::new(rel)
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| format!("{orchestrator_dir}/{}", p.display()))
            })
            .collect();
        dirs.sort();
        dirs.dedup();
        if !dirs.is_empty() {
            let mkdir = format!("mkdir -p {}", dirs.join(" "));
            match session.run_command(&mkdir, self.command_timeout) {
                Ok(out) if out.success() || out.stderr.contains("File exists") => {}
                Ok(out) => {
                    let detail = out.stderr.trim().to_string();
                    warn!(stderr = %detail, "failed to create fallback directories");
                    log.push(format!("warning: failed to create directories: {detail}"));
                }
                Err(err) => {
                    warn!(error = %err, "failed to create fallback directories");
                    log.push(format!("warning: failed to create directories: {err}"));
                }
            }
        }

        for (rel, content) in files {
            if let Err(err) = session.transfer_file(&content, &format!("{orchestrator_dir}/{rel}")) {
                warn!(file = %rel, error = %err, "failed to copy orchestrator file");
                log.push(format!("warning: failed to copy {rel}: {err}"));
            }
        }
    }
}

/// Curated file list for the per-file fallback: the container build
/// files plus every source file under `app/`.
fn collect_source_files(source: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();

    for name in ["Dockerfile", "requirements.txt"] {
        match std::fs::read_to_string(source.join(name)) {
            Ok(content) => files.push((name.to_string(), content)),
            Err(err) => warn!(file = name, error = %err, "skipping unreadable build file"),
        }
    }

    collect_dir_files(&source.join("app"), "app", &mut files);
    files
}

fn collect_dir_files(dir: &Path, relative: &str, files: &mut Vec<(String, String)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "cannot read source directory");
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = format!("{relative}/{name}");

        if path.is_dir() {
            collect_dir_files(&path, &rel, files);
        } else {
            match std::fs::read_to_string(&path) {
                Ok(content) => files.push((rel, content)),
                Err(err) => warn!(file = %path.display(), error = %err, "skipping unreadable file"),
            }
        }
    }
}

fn fatal(step: &str, err: &DeployError) -> DeployError {
    DeployError::StepFailed {
        step: step.to_string(),
        detail: err.to_string(),
    }
}

fn require_success(step: &str, out: &CmdOutput) -> DeployResult<()> {
    if out.success() {
        return Ok(());
    }
    let stderr = out.stderr.trim();
    let detail = if stderr.is_empty() {
        out.stdout.trim()
    } else {
        stderr
    };
    Err(DeployError::StepFailed {
        step: step.to_string(),
        detail: detail.to_string(),
    })
}
