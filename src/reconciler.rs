//! Read-modify-write cycle over the hosts file.
//!
//! Every pass locks the file, decodes it, drops the owned lines the change
//! applies to, appends the desired ones and writes the result back. Foreign
//! lines keep their content and relative order.

use log::{debug, info, warn};

use crate::error::HostsError;
use crate::hosts::codec::{is_encodable, LineEnding};
use crate::hosts::{decode, encode, FileLine, HostsFile};
use crate::types::{Attachment, HostRecord};

/// Which owned lines a pass replaces, and with what.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change<'a> {
    /// Replace the lines of one container with `records` (possibly none).
    Container {
        container_id: &'a str,
        records: Vec<HostRecord>,
    },
    /// Drop every owned line, whoever owns it.
    Purge,
}

/// Owned lines added and removed by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delta {
    pub added: usize,
    pub removed: usize,
}

/// Single writer of owned hosts entries.
#[derive(Debug, Clone)]
pub struct Reconciler {
    hosts: HostsFile,
}

impl Reconciler {
    pub fn new(hosts: HostsFile) -> Self {
        Self { hosts }
    }

    /// Brings the owned lines of `container_id` in line with `aliases`.
    ///
    /// With `add` unset the container loses all its lines and `aliases` and
    /// `address` are ignored. Re-applying the same call leaves the file as is.
    pub async fn reconcile(
        &self,
        container_id: &str,
        aliases: &[String],
        address: &str,
        add: bool,
    ) -> Result<Delta, HostsError> {
        let records = if add {
            desired_records(container_id, aliases, address)
        } else {
            Vec::new()
        };
        self.apply(Change::Container {
            container_id,
            records,
        })
        .await
    }

    pub async fn attach(
        &self,
        container_id: &str,
        attachment: &Attachment,
    ) -> Result<Delta, HostsError> {
        self.reconcile(
            container_id,
            &attachment.aliases,
            &attachment.address,
            true,
        )
        .await
    }

    pub async fn detach(&self, container_id: &str) -> Result<Delta, HostsError> {
        self.reconcile(container_id, &[], "", false).await
    }

    /// Removes every owned line, including ones left by a previous run.
    pub async fn clean_all(&self) -> Result<Delta, HostsError> {
        self.apply(Change::Purge).await
    }

    async fn apply(&self, change: Change<'_>) -> Result<Delta, HostsError> {
        let mut lock = self.hosts.acquire().await?;
        let current = lock.read()?;

        let mut document = decode(&current);
        let (lines, delta) = plan(document.lines, change, document.ending);
        document.lines = lines;

        let updated = encode(&document);
        if updated == current {
            debug!("Hosts file {} already up to date", self.hosts.path().display());
        } else {
            lock.replace(&updated)?;
            info!(
                "Updated {}: +{} -{} entries",
                self.hosts.path().display(),
                delta.added,
                delta.removed
            );
        }
        Ok(delta)
    }
}

/// One record per distinct alias, in first-seen order. Only fields that
/// decode back to an owned line are written.
fn desired_records(container_id: &str, aliases: &[String], address: &str) -> Vec<HostRecord> {
    let address = address.trim();
    if !is_encodable(container_id) || !is_encodable(address) {
        warn!(
            "Not writing entries for {:?}: unusable address {:?}",
            container_id, address
        );
        return Vec::new();
    }

    let mut records: Vec<HostRecord> = Vec::with_capacity(aliases.len());
    for alias in aliases.iter().map(|a| a.trim()) {
        if alias.is_empty() || records.iter().any(|r| r.alias == alias) {
            continue;
        }
        if !is_encodable(alias) {
            warn!("Skipping alias {:?} of {}", alias, container_id);
            continue;
        }
        records.push(HostRecord {
            address: address.to_string(),
            alias: alias.to_string(),
            container_id: container_id.to_string(),
        });
    }
    records
}

fn plan(
    lines: Vec<FileLine>,
    change: Change<'_>,
    ending: LineEnding,
) -> (Vec<FileLine>, Delta) {
    let before = lines.len();
    let (mut kept, records): (Vec<FileLine>, Vec<HostRecord>) = match change {
        Change::Container {
            container_id,
            records,
        } => (
            lines
                .into_iter()
                .filter(|line| !line.is_owned_by(container_id))
                .collect(),
            records,
        ),
        Change::Purge => (
            lines.into_iter().filter(|line| !line.is_managed()).collect(),
            Vec::new(),
        ),
    };
    let delta = Delta {
        added: records.len(),
        removed: before - kept.len(),
    };
    kept.extend(records.into_iter().map(|r| FileLine::owned(r, ending)));
    (kept, delta)
}
