use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, PipelineLog};
use chaos_tunnel_faults::prelude::{FaultDescriptor, FaultIdentity};

use crate::backend::FaultBackend;

/// Environment variable to override the path to the `kubectl` binary.
pub const KUBECTL_PATH_ENV: &str = "CHAOS_TUNNEL_KUBECTL";

/// Applies Chaos Mesh manifests by piping them to `kubectl apply -f -`.
#[derive(Debug, Clone)]
pub struct KubectlBackend {
    program: PathBuf,
    kubeconfig: Option<PathBuf>,
    log: PipelineLog,
}

impl KubectlBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            kubeconfig: None,
            log: PipelineLog::disabled(),
        }
    }

    /// Find `kubectl`.
    ///
    /// If [`KUBECTL_PATH_ENV`] is set it must point at an existing file, otherwise `kubectl` is
    /// looked up in the user's `PATH`.
    pub fn locate() -> ChaosResult<Self> {
        match env::var(KUBECTL_PATH_ENV).ok().as_deref() {
            Some("") => Err(ChaosError::Backend(format!(
                "'{KUBECTL_PATH_ENV}' set to empty string"
            ))),
            Some(path) => {
                let program = PathBuf::from(path);
                if !program.exists() {
                    return Err(ChaosError::Backend(format!(
                        "'{KUBECTL_PATH_ENV}={path}' does not exist"
                    )));
                }
                Ok(Self::new(program))
            }
            None => which::which("kubectl").map(Self::new).map_err(|e| {
                ChaosError::Backend(format!(
                    "kubectl not found in PATH ({e}). Install it or set '{KUBECTL_PATH_ENV}'"
                ))
            }),
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// Append every kubectl invocation and its output to `log`.
    pub fn with_log(mut self, log: PipelineLog) -> Self {
        self.log = log;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(kubeconfig) = &self.kubeconfig {
            command.arg("--kubeconfig").arg(kubeconfig);
        }
        command
    }
}

impl FaultBackend for KubectlBackend {
    fn apply(&self, descriptor: &FaultDescriptor) -> ChaosResult<()> {
        let manifest = descriptor.to_manifest()?;
        let apply_error = |reason: String| ChaosError::ApplyError {
            name: descriptor.name().to_string(),
            reason,
        };

        let mut child = self
            .command()
            .args(["apply", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| apply_error(format!("failed to run {}: {e}", self.program.display())))?;
        log::debug!("Running kubectl apply with PID: {pid}", pid = child.id());

        send_manifest(&mut child, manifest.as_bytes())
            .map_err(|e| apply_error(format!("failed to send manifest: {e}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| apply_error(format!("failed to wait for kubectl: {e}")))?;
        self.log
            .record_output("kubectl", &format!("kubectl apply -f - ({})", descriptor.identity()), &output);

        if output.status.success() {
            log::info!("Applied {}", descriptor.identity());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(apply_error(format!("kubectl apply exited with {}: {stderr}", output.status)))
        }
    }

    fn delete(&self, identity: &FaultIdentity) -> ChaosResult<()> {
        let output = self
            .command()
            .arg("delete")
            .arg(identity.resource.plural())
            .arg(&identity.name)
            .arg("-n")
            .arg(&identity.namespace)
            .arg("--ignore-not-found")
            .output()
            .map_err(|e| {
                ChaosError::Backend(format!("failed to run {}: {e}", self.program.display()))
            })?;
        self.log
            .record_output("kubectl", &format!("kubectl delete {identity}"), &output);

        if output.status.success() {
            log::debug!("Deleted {identity} (if it existed)");
            Ok(())
        } else {
            Err(ChaosError::Backend(format!(
                "kubectl delete {identity} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Write `manifest` to the child's stdin and close it. If the write fails the child is killed and
/// reaped before the error is returned.
fn send_manifest(child: &mut Child, manifest: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(manifest) {
        drop(stdin);
        if let Err(kill) = child.kill() {
            log::warn!("Failed to kill kubectl with PID {}: {kill}", child.id());
        }
        if let Err(wait) = child.wait() {
            log::warn!("Failed to wait for kubectl with PID {}: {wait}", child.id());
        }
        return Err(e);
    }
    Ok(())
}
