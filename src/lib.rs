//! Remote deployment orchestrator for a self-hosted publishing
//! stack.
//!
//! Estivador takes a stored VPS target plus a set of named variables,
//! opens credentialed SSH sessions, renders a multi-service
//! `docker-compose.yml` and its environment files, ships everything
//! to the host, and drives an idempotent bring-up of the stack -
//! while persisting a deployment record through every state
//! transition.
//!
//! The name comes from Portuguese for *stevedore*: the dockworker who
//! loads cargo onto a ship bound for a remote port.
//!
//! # Overview
//!
//! A deployment is one call to [`Pipeline::deploy`], which wires
//! together:
//!
//! - A [`SecretCodec`] for credential material stored encrypted at
//!   rest (AES-256-GCM over a PBKDF2-derived key)
//! - A [`TargetStore`] and [`RecordStore`] backed by your hosted
//!   database (external collaborators, consumed as traits)
//! - A [`RemoteExecutor`] - by default [`SshSession`], one fresh
//!   `ssh`/`scp` subprocess per call
//! - Pure artifact generators ([`compose`], [`envfile`], [`vars`])
//!   for the descriptor and env files
//!
//! # Architecture
//!
//! The run follows a fixed linear sequence:
//!
//! 1. **Resolve** - look up the target scoped to the caller, create
//!    the deployment record (`pending`)
//! 2. **Decrypt** - recover the SSH credential, falling back to
//!    legacy plaintext values with a warning
//! 3. **Render** - descriptor, root env file, orchestrator env file
//! 4. **Ship** - create remote directories, transfer artifacts and
//!    the orchestrator source tree (bundle first, per-file fallback)
//! 5. **Bring up** - `docker compose up -d --build`, then capture
//!    `docker compose ps` for the record
//!
//! Every fatal step marks the record `failed` with its log trail
//! before the error reaches the caller; terminal states are reached
//! exactly once.
//!
//! # Example
//!
//! ```rust,no_run
//! use estivador::store::{DeploymentRecord, RecordPatch, RecordStore, TargetStore};
//! use estivador::{DeployRequest, DeployResult, Pipeline, SecretCodec, VpsTarget};
//!
//! /// Client for the hosted relational store.
//! struct Db;
//!
//! impl TargetStore for Db {
//!     fn get_target(&self, id: &str, caller_id: &str) -> DeployResult<Option<VpsTarget>> {
//!         todo!("SELECT .. FROM vps_targets WHERE id = $1 AND user_id = $2")
//!     }
//! }
//!
//! impl RecordStore for Db {
//!     fn create_record(
//!         &self,
//!         vps_target_id: &str,
//!         workflow_id: Option<&str>,
//!     ) -> DeployResult<DeploymentRecord> {
//!         todo!("INSERT INTO deployments ..")
//!     }
//!
//!     fn update_record(&self, id: &str, patch: RecordPatch) -> DeployResult<()> {
//!         todo!("UPDATE deployments SET .. WHERE id = $1")
//!     }
//! }
//!
//! fn main() -> DeployResult<()> {
//!     let codec = SecretCodec::new("operator-secret")?;
//!     let pipeline = Pipeline::new(codec, Db, Db)
//!         .deploy_dir("/opt/postiz-platform")
//!         .orchestrator_source("deploy/content-orchestrator");
//!
//!     let request = DeployRequest {
//!         vps_target_id: "t1".into(),
//!         workflow_id: None,
//!         variables: [
//!             ("DOMAIN_NAME".to_string(), "x.io".to_string()),
//!             ("SSL_EMAIL".to_string(), "admin@x.io".to_string()),
//!         ]
//!         .into_iter()
//!         .collect(),
//!     };
//!
//!     let outcome = pipeline.deploy("user-1", &request)?;
//!     println!("postiz up at {}", outcome.urls.postiz_url);
//!     Ok(())
//! }
//! ```
//!
//! # Security notes
//!
//! - Targets may pin an SSH host key; sessions then verify it and
//!   fail closed. Targets without a pin are trusted on first contact
//!   (a freshly provisioned host has no fingerprint yet) — logged as
//!   a warning. See [`SshSession`].
//! - Stored credentials that fail to decrypt are used verbatim as a
//!   legacy-compatibility shim. Treat this as a migration path to be
//!   retired, not a contract.

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cmd;
pub mod compose;
pub mod envfile;
pub mod error;
pub mod pipeline;
pub mod secret;
pub mod ssh;
pub mod store;
pub mod target;
pub mod vars;

pub use cmd::CmdOutput;
pub use error::{DeployError, DeployResult};
pub use pipeline::{DeployOutcome, DeployRequest, DeployUrls, Pipeline};
pub use secret::SecretCodec;
pub use ssh::{RemoteExecutor, SshSession};
pub use store::{DeployStatus, DeploymentRecord, RecordPatch, RecordStore, TargetStore};
pub use target::{AuthMode, Credential, VpsTarget};
