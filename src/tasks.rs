//! Async helpers for working on many containers at once
//!
//! A container must not be written by two operations at the same time.
//! [`ContainerLocks`] hands out one lock per path so different containers can
//! be processed in parallel while work on the same container is serialized.
//! A path's entry is removed when its last guard is released with no task
//! waiting, so the map only holds containers currently in use.

use crate::error::{ImsError, Result};
use crate::metadata::read_metadata;
use crate::settings::{ChannelSettings, SettingsFields};
use crate::settings_writer::{write_channel_settings, AccessMode};
use futures::future::try_join_all;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<PathBuf, Arc<AsyncMutex<()>>>;

/// Per-container locks keyed by path
#[derive(Debug, Default, Clone)]
pub struct ContainerLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Exclusive access to one container, held until dropped.
#[derive(Debug)]
pub struct ContainerGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        self.guard.take();
        // Waiters clone the entry under the map lock, so a count of one means
        // nobody else wants this path.
        if locks.get(&self.path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.path);
        }
    }
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the container at `path`.
    pub async fn lock(&self, path: impl AsRef<Path>) -> ContainerGuard {
        let path = path.as_ref().to_path_buf();
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(path.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        ContainerGuard {
            guard: Some(guard),
            path,
            locks: Arc::clone(&self.locks),
        }
    }

    /// Run a blocking container operation while holding the lock of `path`.
    pub async fn run<T, F>(&self, path: impl AsRef<Path>, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let _guard = self.lock(path).await;
        tokio::task::spawn_blocking(operation).await?
    }

    /// Number of paths currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Outcome of a batch settings application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Containers that were updated
    pub updated: Vec<PathBuf>,
    /// Containers with more channels than there were settings; only their
    /// first channels were updated
    pub more_channels_than_settings: Vec<PathBuf>,
}

/// Apply the same channel display settings to many containers concurrently.
///
/// Each container receives the first `min(settings, channels)` entries,
/// restricted to `fields`. Fails on the first container that cannot be updated.
pub async fn apply_channel_settings(
    paths: &[PathBuf],
    settings: &[(usize, ChannelSettings)],
    fields: SettingsFields,
) -> Result<BatchReport> {
    let locks = ContainerLocks::new();
    let settings = Arc::new(settings.to_vec());
    let jobs = paths.iter().map(|path| {
        let locks = locks.clone();
        let settings = Arc::clone(&settings);
        let path = path.clone();
        async move {
            let target = path.clone();
            let truncated = locks
                .run(&path, move || {
                    let channels = read_metadata(&target)?.channel_count();
                    let count = channels.min(settings.len());
                    write_channel_settings(&settings[..count], fields, &target, AccessMode::Append)?;
                    Ok(channels > settings.len())
                })
                .await?;
            Ok::<_, ImsError>((path, truncated))
        }
    });

    let mut report = BatchReport::default();
    for (path, truncated) in try_join_all(jobs).await? {
        if truncated {
            warn!("{} has more channels than settings", path.display());
            report.more_channels_than_settings.push(path.clone());
        }
        report.updated.push(path);
    }
    info!("applied channel settings to {} containers", report.updated.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_serialized() {
        let locks = ContainerLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs = (0..4).map(|_| {
            let locks = locks.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                locks
                    .run("same.ims", move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }
        });
        try_join_all(jobs).await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_paths_get_distinct_locks() {
        let locks = ContainerLocks::new();
        let a = locks.lock("a.ims").await;
        let b = locks.lock("b.ims").await;
        assert_eq!(locks.len(), 2);
        drop(a);
        assert_eq!(locks.len(), 1);
        drop(b);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_task_waits() {
        let locks = ContainerLocks::new();
        let first = locks.lock("busy.ims").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.lock("busy.ims").await;
            })
        };
        while Arc::strong_count(&locks.locks.lock()[Path::new("busy.ims")]) < 2 {
            tokio::task::yield_now().await;
        }
        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_many_containers_leave_no_entries() {
        let locks = ContainerLocks::new();
        let jobs = (0..32).map(|i| {
            let locks = locks.clone();
            async move { locks.run(format!("c{i}.ims"), move || Ok(i)).await }
        });
        let done = try_join_all(jobs).await.unwrap();
        assert_eq!(done.len(), 32);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_container_fails_batch() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = vec![dir.path().join("absent.ims")];
        let settings = vec![(0, ChannelSettings::default().with_alpha(0.5))];
        assert!(apply_channel_settings(&paths, &settings, SettingsFields::ALL)
            .await
            .is_err());
    }
}
