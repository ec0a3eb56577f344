// SPDX-License-Identifier: GPL-3.0-only

//! Logind client (§4.6): an optional external collaborator emitting
//! `PrepareForSleep(bool)` ahead of and after system suspend.

use zbus::Connection;

#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait Manager {
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// A connected logind client, or `None` when `--disable-logind` was given.
pub struct Logind {
    proxy: ManagerProxy<'static>,
}

impl Logind {
    pub async fn connect(connection: &Connection) -> zbus::Result<Self> {
        Ok(Self { proxy: ManagerProxy::new(connection).await? })
    }

    /// A stream of sleep edges: `true` entering sleep, `false` on resume.
    pub async fn sleep_edges(&self) -> zbus::Result<PrepareForSleepStream<'_>> {
        self.proxy.receive_prepare_for_sleep().await
    }
}
