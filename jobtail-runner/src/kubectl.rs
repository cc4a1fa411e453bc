//! kubectl invocation
//!
//! Every interaction with the scheduler goes through the `kubectl` binary:
//! - Checking kubectl availability
//! - Running bounded one-shot queries and mutations
//! - Building long-lived commands such as `kubectl logs --follow`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Output of a finished kubectl invocation
#[derive(Debug, Clone)]
pub struct KubectlOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl KubectlOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a failed invocation into an error carrying its output
    pub fn into_result(self, what: &str) -> Result<Self> {
        if !self.success() {
            anyhow::bail!(
                "{} failed: exit_code={}, stderr='{}'",
                what,
                self.exit_code,
                self.stderr.trim()
            );
        }
        Ok(self)
    }
}

/// kubectl bound to one access context
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    kubeconfig: PathBuf,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: kubeconfig.into(),
        }
    }

    /// Checks that the kubectl binary runs
    pub async fn check_available(&self) -> Result<()> {
        let output = self
            .run(&["version", "--client"], None, Duration::from_secs(10))
            .await
            .with_context(|| format!("Failed to execute '{} version --client'. Is kubectl installed?", self.binary))?
            .into_result("kubectl version")?;

        let version = output.stdout.lines().next().unwrap_or_default();
        info!("kubectl is available: {}", version.trim());

        Ok(())
    }

    /// Base command with the access context applied
    ///
    /// The child is killed if its handle is dropped.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--kubeconfig")
            .arg(&self.kubeconfig)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// Runs a command to completion within `timeout`
    ///
    /// # Arguments
    /// * `args` - Arguments after the access context flags
    /// * `stdin` - Text piped to the child's standard input
    /// * `timeout` - Upper bound for the whole invocation
    pub async fn run<S: AsRef<str>>(
        &self,
        args: &[S],
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<KubectlOutput> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        debug!("Running kubectl {}", args.join(" "));

        let mut command = self.command();
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        let pipe = match stdin {
            Some(_) => Some(
                child
                    .stdin
                    .take()
                    .context("kubectl stdin was not captured")?,
            ),
            None => None,
        };

        // Feeding stdin is bounded too; a child that never reads it must not
        // stall the caller. On timeout the future is dropped, which kills the
        // child.
        let exchange = async move {
            if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
                pipe.write_all(input.as_bytes())
                    .await
                    .context("Failed to write to kubectl stdin")?;
                // Closing stdin lets kubectl see end of input
                drop(pipe);
            }
            let output = child
                .wait_with_output()
                .await
                .context("Failed to wait for kubectl")?;
            Ok::<_, anyhow::Error>(output)
        };

        let output = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| anyhow::anyhow!("kubectl {} timed out after {:?}", args.join(" "), timeout))??;

        let result = KubectlOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !result.stderr.trim().is_empty() {
            debug!("kubectl stderr: {}", result.stderr.trim());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_output_into_result() {
        let output = KubectlOutput {
            stdout: String::new(),
            stderr: "Error from server (NotFound)\n".to_string(),
            exit_code: 1,
        };
        let err = output.into_result("kubectl get job").unwrap_err();
        assert!(err.to_string().contains("exit_code=1"));
        assert!(err.to_string().contains("NotFound"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unread_stdin_is_bounded_by_timeout() {
        // A kubectl stand-in that never reads its input
        let script = std::env::temp_dir().join(format!("jobtail-fake-kubectl-{}", uuid::Uuid::new_v4()));
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let kubectl = Kubectl::new(script.to_string_lossy().to_string(), "/tmp/kubeconfig");

        // Larger than a pipe buffer, so the write blocks
        let descriptor = "x".repeat(1 << 20);

        let mut attempts = 0;
        let err = loop {
            let started = std::time::Instant::now();
            let err = kubectl
                .run(&["create", "-f", "-"], Some(descriptor.as_str()), Duration::from_millis(500))
                .await
                .unwrap_err();

            // A freshly written script can briefly be busy (ETXTBSY) under parallel tests
            if format!("{:#}", err).contains("Failed to spawn") && attempts < 5 {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            assert!(started.elapsed() < Duration::from_secs(10));
            break err;
        };

        assert!(err.to_string().contains("timed out"), "unexpected error: {:#}", err);
        std::fs::remove_file(script).unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let kubectl = Kubectl::new("/nonexistent/jobtail/kubectl", "/tmp/kubeconfig");
        assert!(kubectl.check_available().await.is_err());
    }
}
