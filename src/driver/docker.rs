// src/driver/docker.rs

//! Container backend driven through the `docker` CLI.
//!
//! `build` bakes one image per release (base image + unpacked slug) and
//! records it on the release. Each dyno is an attached `docker run --rm`
//! process, so waiting on the container is waiting on that process.
//! Containers shut down slowly; `stop` only fires `docker stop` from the
//! unit's reaper and returns.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::driver::unit::{StopMethod, UnitTable};
use crate::driver::{DriverFuture, Dyno, DynoDriver};
use crate::errors::{Result, SupervisorError};
use crate::types::{ExitStatus, Release};

#[derive(Debug)]
pub struct DockerDynoDriver {
    base_image: String,
    units: UnitTable,
}

impl DockerDynoDriver {
    pub fn new(base_image: String, stop_timeout: Duration) -> Self {
        Self {
            base_image,
            units: UnitTable::new(stop_timeout),
        }
    }

    /// Tag used for a release's image.
    pub fn image_name(release: &Release) -> String {
        format!("dynosup/{}:{}", release.app_name(), release.version())
    }

    /// Container name for a dyno; unique per release.
    pub fn container_name(dyno: &Dyno) -> String {
        format!(
            "{}-{}-{}",
            dyno.release().name(),
            dyno.process_type(),
            dyno.process_id()
        )
    }

    /// Dockerfile fed to `docker build` on stdin.
    pub fn dockerfile(&self, release: &Release) -> String {
        let mut df = format!("FROM {}\nRUN mkdir -p /app\n", self.base_image);
        if let Some(slug) = release.slug_url() {
            df.push_str(&format!(
                "RUN curl -sSL '{slug}' | tar -xzf - -C /app\n"
            ));
        }
        df.push_str("WORKDIR /app\nENV HOME=/app\n");
        df
    }

    /// Arguments for `docker run` (without the leading `docker`).
    pub fn run_args(dyno: &Dyno, image: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            Self::container_name(dyno),
        ];
        for (k, v) in dyno.env() {
            args.push("-e".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push(image.to_string());
        args.extend(dyno.args().iter().cloned());
        args
    }

    async fn build_image(&self, release: &Release, image: &str) -> Result<()> {
        let mut child = Command::new("docker")
            .args(["build", "-t", image, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .context("spawning docker build")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.dockerfile(release).as_bytes())
                .await
                .context("writing Dockerfile to docker build")?;
        }

        let status = child.wait().await.context("waiting for docker build")?;
        if !status.success() {
            return Err(SupervisorError::BuildFailed {
                release: release.name(),
                reason: format!("docker build exited with {status}"),
            });
        }
        Ok(())
    }
}

impl DynoDriver for DockerDynoDriver {
    fn build<'a>(&'a self, release: &'a mut Release) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let image = Self::image_name(release);
            info!(release = %release.name(), image = %image, "building image");
            self.build_image(release, &image).await?;
            release.set_image_name(image);
            Ok(())
        })
    }

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let image = dyno.release().image_name().ok_or_else(|| {
                SupervisorError::DriverError(format!(
                    "release {} has no image; was it built?",
                    dyno.release().name()
                ))
            })?;

            let mut cmd = Command::new("docker");
            cmd.args(Self::run_args(dyno, image));

            let grace = self.units.grace().as_secs().to_string();
            let stop = StopMethod::Command(vec![
                "docker".to_string(),
                "stop".to_string(),
                "-t".to_string(),
                grace,
                Self::container_name(dyno),
            ]);
            self.units.spawn(dyno, cmd, stop)
        })
    }

    fn stop<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move { self.units.request_stop(dyno) })
    }

    fn wait<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, ExitStatus> {
        Box::pin(self.units.wait(dyno))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;

    fn release() -> Release {
        let mut config = HashMap::new();
        config.insert("PORT".to_string(), "5000".to_string());
        Release::new("shop", 4, config, Some("https://example.com/slug.tgz".to_string()))
    }

    #[test]
    fn image_is_tagged_by_app_and_version() {
        assert_eq!(DockerDynoDriver::image_name(&release()), "dynosup/shop:4");
    }

    #[test]
    fn dockerfile_unpacks_slug_when_present() {
        let d = DockerDynoDriver::new("heroku/cedar:14".to_string(), Duration::from_secs(10));
        let df = d.dockerfile(&release());
        assert!(df.starts_with("FROM heroku/cedar:14\n"));
        assert!(df.contains("https://example.com/slug.tgz"));

        let bare = Release::new("shop", 4, HashMap::new(), None);
        assert!(!d.dockerfile(&bare).contains("curl"));
    }

    #[test]
    fn run_args_name_container_and_pass_env() {
        let dyno = Dyno::new(
            Arc::new(release()),
            "web",
            "1",
            vec!["bin/web".to_string(), "-p".to_string()],
        );
        let args = DockerDynoDriver::run_args(&dyno, "dynosup/shop:4");

        assert_eq!(&args[..4], ["run", "--rm", "--name", "shop-4-web-1"]);
        assert!(args.contains(&"PORT=5000".to_string()));
        assert!(args.contains(&"DYNO=web.1".to_string()));
        assert_eq!(&args[args.len() - 3..], ["dynosup/shop:4", "bin/web", "-p"]);
    }
}
