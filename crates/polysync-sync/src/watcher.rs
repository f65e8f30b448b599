//! Push notifications for the local adapter
//!
//! [`ChangeWatcher`] wraps the `notify` crate and turns raw OS events into
//! [`ChangeNotification`]s relative to the adapter root. Notifications are
//! queued until the engine drains them.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents / ReadDirectoryChangesW
//!       │
//!       ▼
//!  RecommendedWatcher callback  ──→  notification queue  ──→  drain_notifications()
//! ```
//!
//! While notifications are off, or after the watcher lost events, the
//! engine falls back to polling and [`IPushNotifiable::next_check_time`]
//! tells it when to scan.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use polysync_core::domain::{RelativePath, SyncFault};
use polysync_core::ports::{ChangeNotification, IPushNotifiable};
use tracing::{debug, error, info, warn};

use crate::filesystem::is_temp_name;
use crate::lock;

/// Queue length beyond which pending notifications are discarded in favour
/// of a full scan
const MAX_PENDING: usize = 4096;

// ============================================================================
// Notification queue
// ============================================================================

/// State shared with the watcher callback thread
#[derive(Debug, Default)]
struct NotificationQueue {
    pending: Mutex<VecDeque<ChangeNotification>>,
    /// Set when events were lost; cleared by the next drain
    lost_events: AtomicBool,
}

impl NotificationQueue {
    fn push(&self, relative_path: RelativePath) {
        let mut pending = lock(&self.pending);
        let observed_at = Utc::now();

        if let Some(existing) = pending
            .iter_mut()
            .find(|n| n.relative_path == relative_path)
        {
            existing.observed_at = observed_at;
            return;
        }

        if pending.len() >= MAX_PENDING {
            warn!(
                pending = pending.len(),
                "Notification queue overflowed, falling back to a full scan"
            );
            pending.clear();
            self.lost_events.store(true, Ordering::SeqCst);
            return;
        }

        pending.push_back(ChangeNotification {
            relative_path,
            observed_at,
        });
    }

    fn mark_lost(&self) {
        self.lost_events.store(true, Ordering::SeqCst);
    }

    fn drain(&self) -> Vec<ChangeNotification> {
        self.lost_events.store(false, Ordering::SeqCst);
        lock(&self.pending).drain(..).collect()
    }
}

// ============================================================================
// Event mapping
// ============================================================================

/// Converts a `notify::Event` into the root-relative paths it touches
///
/// Access events are ignored, as are paths outside the root and the
/// adapter's own in-flight temporary files. A rename reports both its old
/// and its new path.
fn map_notify_event(root: &Path, event: &notify::Event) -> Vec<RelativePath> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(root).ok()?;
            if relative
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_temp_name)
            {
                return None;
            }
            let relative = relative.to_str()?;
            match RelativePath::new(relative) {
                Ok(relative) => Some(relative),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Ignoring unrepresentable path");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// ChangeWatcher
// ============================================================================

/// Recursive watcher over an adapter root
///
/// Created disabled. Enabling it starts an OS watch; disabling it drops the
/// watch and leaves already queued notifications in place.
pub struct ChangeWatcher {
    root: PathBuf,
    poll_interval: Duration,
    queue: Arc<NotificationQueue>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    last_drain: Mutex<DateTime<Utc>>,
}

impl ChangeWatcher {
    /// Creates a disabled watcher for `root`
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
            queue: Arc::new(NotificationQueue::default()),
            watcher: Mutex::new(None),
            last_drain: Mutex::new(Utc::now()),
        }
    }

    /// Directory being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn start(&self) -> Result<RecommendedWatcher, SyncFault> {
        let queue = Arc::clone(&self.queue);
        let root = self.root.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if event.need_rescan() {
                        warn!("Watcher requested a rescan");
                        queue.mark_lost();
                    }
                    for path in map_notify_event(&root, &event) {
                        debug!(path = %path, kind = ?event.kind, "Queued change notification");
                        queue.push(path);
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                    queue.mark_lost();
                }
            },
            notify::Config::default(),
        )
        .map_err(watch_fault)?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(watch_fault)?;
        Ok(watcher)
    }
}

fn watch_fault(err: notify::Error) -> SyncFault {
    match err.kind {
        notify::ErrorKind::Io(io) => SyncFault::Io(io),
        _ => SyncFault::Io(std::io::Error::other(err.to_string())),
    }
}

impl IPushNotifiable for ChangeWatcher {
    fn set_notifications_enabled(&self, enabled: bool) -> Result<(), SyncFault> {
        let mut slot = lock(&self.watcher);
        match (enabled, slot.is_some()) {
            (true, false) => {
                *slot = Some(self.start()?);
                info!(root = %self.root.display(), "Push notifications enabled");
            }
            (false, true) => {
                *slot = None;
                info!(root = %self.root.display(), "Push notifications disabled");
            }
            _ => {}
        }
        Ok(())
    }

    fn notifications_enabled(&self) -> bool {
        lock(&self.watcher).is_some()
    }

    /// `None` while the watch is healthy; now if events were lost; otherwise
    /// one poll interval after the last drain
    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        if self.queue.lost_events.load(Ordering::SeqCst) {
            return Some(Utc::now());
        }
        if self.notifications_enabled() {
            return None;
        }
        let interval = chrono::Duration::from_std(self.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        Some(*lock(&self.last_drain) + interval)
    }

    fn drain_notifications(&self) -> Vec<ChangeNotification> {
        *lock(&self.last_drain) = Utc::now();
        self.queue.drain()
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("root", &self.root)
            .field("poll_interval", &self.poll_interval)
            .field("enabled", &self.notifications_enabled())
            .finish()
    }
}
