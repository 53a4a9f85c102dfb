//! Feeds runtime state into the reconciler.
//!
//! [`Watcher::bootstrap`] seeds the file from the containers running at
//! startup, then [`Watcher::listen`] follows the event stream. Both run on the
//! caller's task, one reconciliation at a time.

use anyhow::{anyhow, Context, Result};
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};

use crate::error::HostsError;
use crate::reconciler::Reconciler;
use crate::runtime::ContainerRuntime;
use crate::types::NetworkEvent;

pub struct Watcher {
    reconciler: Reconciler,
    verbose: bool,
}

impl Watcher {
    pub fn new(reconciler: Reconciler, verbose: bool) -> Self {
        Self {
            reconciler,
            verbose,
        }
    }

    /// Drops every owned entry left over from an earlier run.
    pub async fn clean(&self) {
        match self.reconciler.clean_all().await {
            Ok(delta) => info!("Removed {} stale hosts entries", delta.removed),
            Err(e) => error!("Startup cleanup skipped: {}", self.file_detail(e)),
        }
    }

    /// Reconciles every running container. Fails only if the container list
    /// cannot be fetched.
    pub async fn bootstrap<R>(&self, runtime: &R) -> Result<usize>
    where
        R: ContainerRuntime + Sync + ?Sized,
    {
        let ids = runtime
            .list_running()
            .await
            .context("Failed to list running containers")?;
        info!("Initial scan found {} running containers", ids.len());

        let mut synced = 0;
        for id in &ids {
            if self.sync_container(runtime, id).await {
                synced += 1;
            }
        }
        Ok(synced)
    }

    /// Consumes the event stream until it fails or ends. Per-event failures
    /// are logged and the loop moves on.
    pub async fn listen<R>(&self, runtime: &R) -> Result<()>
    where
        R: ContainerRuntime + Sync + ?Sized,
    {
        let mut stream = runtime.events();
        info!("Listening for network events...");

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(event) => self.handle_event(runtime, event).await,
                Err(e) => return Err(e.context("Docker event stream failed")),
            }
        }
        Err(anyhow!("Docker event stream ended"))
    }

    pub async fn handle_event<R>(&self, runtime: &R, event: NetworkEvent)
    where
        R: ContainerRuntime + Sync + ?Sized,
    {
        debug!("Network event: {:?}", event);
        match event {
            NetworkEvent::Attach { container_id } => {
                self.sync_container(runtime, &container_id).await;
            }
            NetworkEvent::Detach { container_id } => {
                if let Err(e) = self.reconciler.detach(&container_id).await {
                    error!(
                        "Failed to remove entries for {}: {}",
                        container_id,
                        self.file_detail(e)
                    );
                }
            }
        }
    }

    /// Inspects one container and writes its entries. Returns whether the
    /// file was reconciled.
    async fn sync_container<R>(&self, runtime: &R, container_id: &str) -> bool
    where
        R: ContainerRuntime + Sync + ?Sized,
    {
        let attachment = match runtime.inspect(container_id).await {
            Ok(Some(attachment)) => attachment,
            Ok(None) => {
                debug!("Container {} is not on the tracked network", container_id);
                return false;
            }
            Err(e) => {
                warn!(
                    "Failed to inspect container {}: {}",
                    container_id,
                    self.detail(&e)
                );
                return false;
            }
        };

        match self.reconciler.attach(container_id, &attachment).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Failed to write entries for {}: {}",
                    container_id,
                    self.file_detail(e)
                );
                false
            }
        }
    }

    fn file_detail(&self, e: HostsError) -> String {
        let hint = e.is_configuration();
        let detail = self.detail(&e.into());
        if hint {
            format!("{} (check HOSTSYNC_HOSTS_PATH and privileges)", detail)
        } else {
            detail
        }
    }

    fn detail(&self, e: &anyhow::Error) -> String {
        describe(e, self.verbose)
    }
}

/// One-line description of `e`. The chain of inner causes is only included
/// in verbose mode.
pub fn describe(e: &anyhow::Error, verbose: bool) -> String {
    if verbose {
        format!("{:#}", e)
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::HostsFile;
    use crate::types::Attachment;
    use async_trait::async_trait;
    use futures_util::stream::{self, BoxStream};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        running: Vec<String>,
        attachments: HashMap<String, Attachment>,
        vanished: Vec<String>,
        events: Mutex<Vec<Result<NetworkEvent>>>,
        list_fails: bool,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn list_running(&self) -> Result<Vec<String>> {
            if self.list_fails {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.running.clone())
        }

        async fn inspect(&self, container_id: &str) -> Result<Option<Attachment>> {
            if self.vanished.iter().any(|id| id == container_id) {
                return Err(anyhow!("no such container: {}", container_id));
            }
            Ok(self.attachments.get(container_id).cloned())
        }

        fn events(&self) -> BoxStream<'_, Result<NetworkEvent>> {
            let events = std::mem::take(&mut *self.events.lock().unwrap());
            stream::iter(events).boxed()
        }
    }

    fn attachment(address: &str, aliases: &[&str]) -> Attachment {
        Attachment {
            address: address.into(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn attach(id: &str) -> Result<NetworkEvent> {
        Ok(NetworkEvent::Attach {
            container_id: id.into(),
        })
    }

    fn detach(id: &str) -> Result<NetworkEvent> {
        Ok(NetworkEvent::Detach {
            container_id: id.into(),
        })
    }

    fn scratch(content: &str) -> (tempfile::TempDir, PathBuf, Watcher) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        let watcher = Watcher::new(Reconciler::new(HostsFile::new(&path)), true);
        (dir, path, watcher)
    }

    #[test]
    fn inner_causes_only_in_verbose_mode() {
        let err = anyhow!("connection refused").context("Docker event stream failed");
        assert_eq!(describe(&err, false), "Docker event stream failed");
        assert_eq!(
            describe(&err, true),
            "Docker event stream failed: connection refused"
        );
    }

    #[tokio::test]
    async fn startup_replaces_stale_entries_with_live_state() {
        let (_dir, path, watcher) = scratch(
            "127.0.0.1 localhost\n\
             10.0.0.9\tweb\t\t#old managed-by-hostsync\n",
        );
        let runtime = FakeRuntime {
            running: vec!["c1".into(), "c2".into(), "gone".into()],
            attachments: HashMap::from([("c1".to_string(), attachment("10.0.0.5", &["web"]))]),
            vanished: vec!["gone".into()],
            ..Default::default()
        };

        watcher.clean().await;
        let synced = watcher.bootstrap(&runtime).await.unwrap();

        assert_eq!(synced, 1);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "127.0.0.1 localhost\n10.0.0.5\tweb\t\t#c1 managed-by-hostsync\n"
        );
    }

    #[tokio::test]
    async fn bootstrap_fails_when_runtime_unreachable() {
        let (_dir, _path, watcher) = scratch("");
        let runtime = FakeRuntime {
            list_fails: true,
            ..Default::default()
        };
        assert!(watcher.bootstrap(&runtime).await.is_err());
    }

    #[tokio::test]
    async fn listener_applies_events_in_order() {
        let (_dir, path, watcher) = scratch("127.0.0.1 localhost\n");
        let runtime = FakeRuntime {
            attachments: HashMap::from([
                ("c1".to_string(), attachment("10.0.0.5", &["web", "app"])),
                ("c2".to_string(), attachment("10.0.0.6", &["db"])),
            ]),
            vanished: vec!["ghost".into()],
            events: Mutex::new(vec![
                attach("c1"),
                attach("ghost"),
                attach("c2"),
                attach("c1"),
                detach("c1"),
                detach("never-seen"),
            ]),
            ..Default::default()
        };

        let err = watcher.listen(&runtime).await.unwrap_err();
        assert!(err.to_string().contains("ended"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "127.0.0.1 localhost\n10.0.0.6\tdb\t\t#c2 managed-by-hostsync\n"
        );
    }

    #[tokio::test]
    async fn stream_error_ends_listener() {
        let (_dir, path, watcher) = scratch("127.0.0.1 localhost\n");
        let runtime = FakeRuntime {
            attachments: HashMap::from([("c1".to_string(), attachment("10.0.0.5", &["web"]))]),
            events: Mutex::new(vec![Err(anyhow!("connection reset")), attach("c1")]),
            ..Default::default()
        };

        let err = watcher.listen(&runtime).await.unwrap_err();
        assert!(err.to_string().contains("event stream failed"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "127.0.0.1 localhost\n");
    }

    #[tokio::test]
    async fn unavailable_file_does_not_stop_listener() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::new(
            Reconciler::new(HostsFile::new(dir.path().join("missing"))),
            false,
        );
        let runtime = FakeRuntime {
            attachments: HashMap::from([("c1".to_string(), attachment("10.0.0.5", &["web"]))]),
            events: Mutex::new(vec![attach("c1"), detach("c1")]),
            ..Default::default()
        };

        let err = watcher.listen(&runtime).await.unwrap_err();
        assert!(err.to_string().contains("ended"));
        assert!(!dir.path().join("missing").exists());
    }
}
