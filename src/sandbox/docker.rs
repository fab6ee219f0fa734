//! Docker sandbox driven through the `docker` CLI.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{RemoveOutcome, RunOutcome, RunRequest, SandboxClient, SandboxError};

pub struct DockerCliSandbox {
    docker_bin: PathBuf,
}

impl DockerCliSandbox {
    pub fn new(docker_bin: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Arguments for `docker run`, without the binary itself.
    pub fn run_args(request: &RunRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];
        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for bind in &request.binds {
            args.push("-v".to_string());
            args.push(bind.to_bind_spec());
        }
        args.push(request.image.clone());
        args.extend(request.args.iter().cloned());
        args
    }
}

fn is_no_such_container(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no such container")
}

#[async_trait]
impl SandboxClient for DockerCliSandbox {
    async fn build_image(&self, image: &str, context: &Path) -> Result<(), SandboxError> {
        info!("Building sandbox image {} from {:?}", image, context);
        let output = self
            .command()
            .arg("build")
            .arg("-t")
            .arg(image)
            .arg(context)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::CommandFailed(format!(
                "docker build {} exited with {}: {}",
                image,
                output.status,
                stderr.trim()
            )));
        }

        info!("Built sandbox image {}", image);
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> RunOutcome {
        for bind in &request.binds {
            if let Err(e) = tokio::fs::create_dir_all(&bind.host_path).await {
                return RunOutcome::failed(
                    None,
                    format!("Failed to prepare volume {:?}: {}", bind.host_path, e),
                );
            }
        }

        let args = Self::run_args(&request);
        debug!("Running container {} with {:?}", request.name, args);

        let output = match self.command().args(&args).output().await {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to launch container {}: {}", request.name, e);
                return RunOutcome::failed(None, format!("Failed to launch docker: {}", e));
            }
        };

        let exit_code = output.status.code();
        if output.status.success() {
            RunOutcome {
                exit_code,
                error: None,
            }
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            RunOutcome::failed(exit_code, stderr.trim().to_string())
        }
    }

    async fn stop(&self, name: &str) -> Result<(), SandboxError> {
        let output = self.command().arg("stop").arg(name).output().await?;
        if output.status.success() {
            info!("Container {} stopped", name);
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SandboxError::CommandFailed(format!(
            "docker stop {}: {}",
            name,
            stderr.trim()
        )))
    }

    async fn remove(&self, name: &str) -> Result<RemoveOutcome, SandboxError> {
        let output = self
            .command()
            .args(["rm", "--force", "--volumes"])
            .arg(name)
            .output()
            .await?;

        if output.status.success() {
            info!("Container {} removed", name);
            return Ok(RemoveOutcome::Removed);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_no_such_container(&stderr) {
            debug!("Container {} does not exist, nothing to remove", name);
            return Ok(RemoveOutcome::AlreadyAbsent);
        }
        Err(SandboxError::CommandFailed(format!(
            "docker rm {}: {}",
            name,
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{OutputLocation, VolumeBind};

    fn request() -> RunRequest {
        RunRequest {
            image: "scraper_bot_1".to_string(),
            name: "img-scraper_bot_1.name-bottles.id-42".to_string(),
            args: vec![
                "/usr/app/data/out_1".to_string(),
                "100".to_string(),
                "300".to_string(),
                "".to_string(),
                "water bottle".to_string(),
            ],
            env: vec![("CONCURRENT_REQUESTS".to_string(), "32".to_string())],
            binds: vec![VolumeBind {
                host_path: PathBuf::from("/srv/scratch/job"),
                sandbox_path: "/usr/app/data".to_string(),
            }],
            output: OutputLocation {
                sandbox_stem: "/usr/app/data/out_1".to_string(),
                host_file: PathBuf::from("/srv/scratch/job/out_1.json"),
            },
        }
    }

    #[test]
    fn test_run_args_layout() {
        let args = DockerCliSandbox::run_args(&request());
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "img-scraper_bot_1.name-bottles.id-42",
                "-e",
                "CONCURRENT_REQUESTS=32",
                "-v",
                "/srv/scratch/job:/usr/app/data",
                "scraper_bot_1",
                "/usr/app/data/out_1",
                "100",
                "300",
                "",
                "water bottle",
            ]
        );
    }

    #[test]
    fn test_no_such_container_detection() {
        assert!(is_no_such_container(
            "Error response from daemon: No such container: foo"
        ));
        assert!(is_no_such_container("Error: no such container: foo"));
        assert!(!is_no_such_container("permission denied"));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failed_run() {
        let sandbox = DockerCliSandbox::new("/nonexistent/docker-binary");
        let mut req = request();
        req.binds.clear();

        let outcome = sandbox.run(req).await;
        assert!(!outcome.is_success());
        assert!(outcome.exit_code.is_none());
        assert!(outcome.error.unwrap().contains("Failed to launch docker"));
    }

    #[tokio::test]
    async fn test_missing_binary_remove_is_spawn_error() {
        let sandbox = DockerCliSandbox::new("/nonexistent/docker-binary");
        assert!(matches!(
            sandbox.remove("anything").await,
            Err(SandboxError::Spawn(_))
        ));
    }
}
