//! [`RegistryClient`] backed by a container CLI (`docker` or a compatible
//! tool such as `podman`).
//!
//! Every call spawns one child process. Output pipes are drained on helper
//! threads while the child is polled against the configured timeout; an
//! expired child is killed and reported as [`ClientError::Timeout`].

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use imgsync_core::naming::local_candidates;

use crate::client::RegistryClient;
use crate::error::ClientError;

/// Per-command timeout used when none is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(900);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Container CLI client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    timeout: Duration,
}

struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, ClientError> {
        let command = self.describe(args);
        tracing::debug!("running: {command}");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_timeout(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClientError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ClientError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        Ok(CommandOutput {
            status,
            stdout: join_output(stdout),
            stderr: join_output(stderr),
        })
    }

    /// Run and require a zero exit status; returns trimmed stdout.
    fn check(&self, args: &[&str]) -> Result<String, ClientError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(self.failed(args, &output))
        }
    }

    fn failed(&self, args: &[&str], output: &CommandOutput) -> ClientError {
        ClientError::CommandFailed {
            command: self.describe(args),
            status: output.status.to_string(),
            stderr: output.stderr.trim().to_string(),
        }
    }
}

impl RegistryClient for DockerCli {
    fn manifest_exists(&self, reference: &str) -> Result<bool, ClientError> {
        let args = ["manifest", "inspect", reference];
        let output = self.run(&args)?;
        if output.status.success() {
            return Ok(true);
        }
        if is_missing_manifest(&output.stderr) {
            return Ok(false);
        }
        Err(self.failed(&args, &output))
    }

    fn pull(&self, reference: &str) -> Result<(), ClientError> {
        self.check(&["pull", reference]).map(|_| ())
    }

    fn local_exists(&self, reference: &str) -> Result<bool, ClientError> {
        let args = ["image", "inspect", "--format", "{{.Id}}", reference];
        let output = self.run(&args)?;
        if output.status.success() {
            return Ok(true);
        }
        if output.stderr.to_ascii_lowercase().contains("no such image") {
            return Ok(false);
        }
        Err(self.failed(&args, &output))
    }

    fn local_digest(&self, reference: &str) -> Result<Option<String>, ClientError> {
        let args = ["image", "inspect", "--format", "{{json .RepoDigests}}", reference];
        let stdout = self.check(&args)?;
        parse_repo_digests(&stdout, &digest_repositories(reference)).map_err(|detail| {
            ClientError::Output {
                command: self.describe(&args),
                detail,
            }
        })
    }

    fn tag(&self, source: &str, target: &str) -> Result<(), ClientError> {
        self.check(&["tag", source, target]).map(|_| ())
    }

    fn push(&self, reference: &str) -> Result<(), ClientError> {
        self.check(&["push", reference]).map(|_| ())
    }
}

/// Pick the digest for the pulled image out of `{{json .RepoDigests}}`.
///
/// Entries look like `<repo>@sha256:<hex>`. Only an entry whose repository
/// is one of `repositories` counts, first listed wins. Entries for other
/// repositories (such as the mirror after an earlier push) are ignored.
pub fn parse_repo_digests(
    output: &str,
    repositories: &[String],
) -> Result<Option<String>, String> {
    let entries: Option<Vec<String>> =
        serde_json::from_str(output.trim()).map_err(|e| format!("invalid RepoDigests: {e}"))?;
    let entries = entries.unwrap_or_default();

    let parsed: Vec<(&str, &str)> = entries
        .iter()
        .filter_map(|entry| entry.split_once('@'))
        .collect();
    let chosen = repositories.iter().find_map(|wanted| {
        parsed
            .iter()
            .find(|(repo, _)| repo == wanted)
            .map(|(_, digest)| digest.to_string())
    });
    Ok(chosen)
}

/// Repository names Docker may list in RepoDigests for the local image
/// `reference`, most specific first (`docker.io/library/redis:7` gives
/// `docker.io/library/redis` and `redis`).
pub fn digest_repositories(reference: &str) -> Vec<String> {
    let (repository, tag) = split_reference(reference);
    local_candidates(repository, tag)
        .iter()
        .map(|candidate| repository_of(candidate).to_string())
        .collect()
}

/// `(<repo>, <tag>)` of `<repo>[:<tag>]`; the tag defaults to `latest`.
pub fn split_reference(reference: &str) -> (&str, &str) {
    let repository = repository_of(reference);
    let tag = reference
        .strip_prefix(repository)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|tag| !tag.is_empty() && !tag.contains('@'))
        .unwrap_or("latest");
    (repository, tag)
}

/// `<repo>` part of `<repo>[:<tag>][@<digest>]`, keeping any `host:port`.
pub fn repository_of(reference: &str) -> &str {
    let without_digest = reference.split_once('@').map_or(reference, |(repo, _)| repo);
    match without_digest.rfind(':') {
        Some(idx) if !without_digest[idx..].contains('/') => &without_digest[..idx],
        _ => without_digest,
    }
}

fn is_missing_manifest(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    ["no such manifest", "manifest unknown", "not found: manifest"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
