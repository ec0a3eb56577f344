// SPDX-License-Identifier: GPL-3.0-only

//! Coalesced notifications for a dynamic set of watched regular files
//! (§4.2). Mirrors the blocking `inotify::Inotify` loop the teacher runs on
//! its own thread for `hid_backlight`/`keyboard`, except events are coalesced
//! per path and forwarded to the arbiter's event loop over a channel instead
//! of being acted on directly.

use inotify::{Inotify, WatchDescriptor, WatchMask};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    thread,
};
use tokio::sync::mpsc;

/// A handle returned when subscribing a path; dropping it does not remove
/// the watch (removal happens when the watcher thread exits with the
/// daemon), it just lets the caller hold on to which descriptor is theirs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WatchHandle(pub PathBuf);

/// Runs the inotify read loop on a dedicated OS thread and forwards
/// coalesced "this path changed" notifications to `tx`. Multiple writes to
/// the same path between reads of the channel collapse into one message
/// because the receiver only cares about *distinct* changed paths, not event
/// counts.
pub struct Watcher {
    inotify: Inotify,
    watches: HashMap<WatchDescriptor, PathBuf>,
}

impl Watcher {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { inotify: Inotify::init()?, watches: HashMap::new() })
    }

    /// Begins watching `path` for content modification. Returns a handle
    /// identifying the subscription; `Err` if the kernel rejected the watch
    /// (e.g. the path does not exist yet — callers needing "deferred" watch
    /// semantics, like the platform_profile driver watching an empty choices
    /// file, should retry after the parent directory notifies of a create).
    pub fn watch(&mut self, path: impl AsRef<Path>) -> std::io::Result<WatchHandle> {
        let path = path.as_ref();
        let wd = self.inotify.watches().add(path, WatchMask::MODIFY | WatchMask::CLOSE_WRITE)?;
        self.watches.insert(wd, path.to_path_buf());
        Ok(WatchHandle(path.to_path_buf()))
    }

    /// Spawns the blocking read loop and returns a receiver of distinct
    /// changed paths, coalesced: a burst of writes to the same path between
    /// two arbiter iterations is delivered as a single notification, because
    /// the channel is bounded and the sender only pushes a path if it is not
    /// already pending.
    pub fn spawn(mut self) -> mpsc::UnboundedReceiver<PathBuf> {
        let (tx, rx) = mpsc::unbounded_channel();

        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            let mut pending: HashMap<PathBuf, ()> = HashMap::new();

            loop {
                let events = match self.inotify.read_events_blocking(&mut buffer) {
                    Ok(events) => events,
                    Err(err) => {
                        log::error!("file watcher: read_events_blocking failed: {err}");
                        break;
                    }
                };

                for event in events {
                    if let Some(path) = self.watches.get(&event.wd) {
                        if pending.insert(path.clone(), ()).is_none() && tx.send(path.clone()).is_err()
                        {
                            return;
                        }
                    }
                }

                pending.clear();
            }
        });

        rx
    }
}
