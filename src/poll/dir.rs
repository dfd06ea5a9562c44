// src/poll/dir.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::loader::{parse_str, CONTROL_FILE_NAME};
use crate::config::model::ReleaseFile;
use crate::config::validate::ensure_app_matches;
use crate::driver::DynoDriver;
use crate::engine::Processes;
use crate::errors::{Result, SupervisorError};
use crate::poll::Poller;

/// Watches `<dir>/release.toml` and emits a new topology whenever its
/// content changes.
///
/// Rewrites with identical content are ignored (compared by blake3 digest),
/// and files that fail to parse or validate are logged and skipped.
pub struct DirPoller {
    dir: PathBuf,
    app_name: Option<String>,
    driver: Arc<dyn DynoDriver>,
}

impl std::fmt::Debug for DirPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirPoller")
            .field("dir", &self.dir)
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl DirPoller {
    pub fn new(
        dir: impl Into<PathBuf>,
        app_name: Option<String>,
        driver: Arc<dyn DynoDriver>,
    ) -> Self {
        Self {
            dir: dir.into(),
            app_name,
            driver,
        }
    }

    pub fn control_file(&self) -> PathBuf {
        self.dir.join(CONTROL_FILE_NAME)
    }

    /// Read the control file and return a topology if its content differs
    /// from `last_digest`, updating the digest on success.
    pub fn snapshot(&self, last_digest: &mut Option<String>) -> Option<Processes> {
        let path = self.control_file();
        let contents = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "no control file yet");
                return None;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "could not read control file");
                return None;
            }
        };

        let digest = blake3::hash(&contents).to_hex().to_string();
        if last_digest.as_deref() == Some(digest.as_str()) {
            debug!(path = ?path, "control file unchanged");
            return None;
        }

        match self.parse(&contents) {
            Ok(file) => {
                *last_digest = Some(digest);
                let release = file.release();
                info!(release = %release.name(), "loaded new release");
                Some(Processes::new(
                    release,
                    file.formations(),
                    Arc::clone(&self.driver),
                ))
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "ignoring invalid control file");
                None
            }
        }
    }

    fn parse(&self, contents: &[u8]) -> Result<ReleaseFile> {
        let text = std::str::from_utf8(contents).map_err(|e| {
            SupervisorError::ConfigError(format!("control file is not UTF-8: {e}"))
        })?;
        let file = ReleaseFile::try_from(parse_str(text)?)?;
        ensure_app_matches(&file, self.app_name.as_deref())?;
        Ok(file)
    }
}

fn touches_control_file(event: &Event) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(Path::new(CONTROL_FILE_NAME).as_os_str()))
}

impl Poller for DirPoller {
    fn poll(self: Box<Self>) -> Result<mpsc::Receiver<Processes>> {
        let (tx, rx) = mpsc::channel::<Processes>(1);

        // Channel from the blocking notify callback into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Err(err) = event_tx.send(event) {
                        eprintln!("dynosup: failed to forward notify event: {err}");
                    }
                }
                Err(err) => {
                    eprintln!("dynosup: control dir watch error: {err}");
                }
            },
            Config::default(),
        )
        .context("creating control dir watcher")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching control dir {:?}", self.dir))?;

        info!(dir = ?self.dir, "watching control directory");

        tokio::spawn(async move {
            // Dropping the watcher stops file watching.
            let _watcher = watcher;
            let mut last_digest = None;

            if let Some(procs) = self.snapshot(&mut last_digest) {
                if tx.send(procs).await.is_err() {
                    return;
                }
            }

            while let Some(event) = event_rx.recv().await {
                if !touches_control_file(&event) {
                    continue;
                }
                debug!(?event, "control file event");

                if let Some(procs) = self.snapshot(&mut last_digest) {
                    if tx.send(procs).await.is_err() {
                        debug!("supervisor went away; poller exiting");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::driver::SimpleDynoDriver;

    fn poller(dir: &Path, app: Option<&str>) -> DirPoller {
        let driver: Arc<dyn DynoDriver> =
            Arc::new(SimpleDynoDriver::new(std::time::Duration::from_secs(1)));
        DirPoller::new(dir, app.map(str::to_string), driver)
    }

    fn release_toml(version: u64) -> String {
        format!(
            "[app]\nname = \"shop\"\nversion = {version}\n\n[[process]]\ntype = \"web\"\nquantity = 2\nargs = [\"bin/web\"]\n"
        )
    }

    #[test]
    fn snapshot_skips_missing_and_unchanged_files() {
        let tmp = tempfile::tempdir().unwrap();
        let p = poller(tmp.path(), None);
        let mut digest = None;

        assert!(p.snapshot(&mut digest).is_none());

        fs::write(p.control_file(), release_toml(1)).unwrap();
        let procs = p.snapshot(&mut digest).expect("first load");
        assert_eq!(procs.release().name(), "shop-1");
        assert_eq!(procs.formations().len(), 1);

        assert!(p.snapshot(&mut digest).is_none(), "same bytes are ignored");

        fs::write(p.control_file(), release_toml(2)).unwrap();
        let procs = p.snapshot(&mut digest).expect("changed file");
        assert_eq!(procs.release().name(), "shop-2");
    }

    #[test]
    fn invalid_file_is_skipped_and_keeps_last_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let p = poller(tmp.path(), None);
        let mut digest = None;

        fs::write(p.control_file(), release_toml(1)).unwrap();
        assert!(p.snapshot(&mut digest).is_some());
        let before = digest.clone();

        fs::write(p.control_file(), "[app]\nname = 'shop'\n").unwrap();
        assert!(p.snapshot(&mut digest).is_none());
        assert_eq!(digest, before);
    }

    #[test]
    fn other_apps_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let p = poller(tmp.path(), Some("billing"));
        let mut digest = None;

        fs::write(p.control_file(), release_toml(1)).unwrap();
        assert!(p.snapshot(&mut digest).is_none());
        assert!(digest.is_none());
    }
}
