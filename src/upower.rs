// SPDX-License-Identifier: GPL-3.0-only

//! Upower client (§4.6): an optional external collaborator exposing
//! `OnBattery` and a display-device `Percentage`. Mirrors the proxy-trait
//! style the teacher's `zbus` subcrate generates, but async end to end since
//! the whole daemon runs on a `current_thread` tokio runtime.

use zbus::Connection;

#[zbus::proxy(
    interface = "org.freedesktop.UPower",
    default_service = "org.freedesktop.UPower",
    default_path = "/org/freedesktop/UPower"
)]
trait UPower {
    fn get_display_device(&self) -> zbus::Result<zbus::zvariant::OwnedObjectPath>;

    #[zbus(property)]
    fn on_battery(&self) -> zbus::Result<bool>;
}

#[zbus::proxy(interface = "org.freedesktop.UPower.Device", default_service = "org.freedesktop.UPower")]
trait UPowerDevice {
    #[zbus(property)]
    fn percentage(&self) -> zbus::Result<f64>;
}

/// A connected upower client, or `None` when `--disable-upower` was given or
/// the service is absent at startup.
pub struct Upower {
    proxy: UPowerProxy<'static>,
    device: UPowerDeviceProxy<'static>,
}

impl Upower {
    pub async fn connect(connection: &Connection) -> zbus::Result<Self> {
        let proxy = UPowerProxy::new(connection).await?;
        let display_device = proxy.get_display_device().await?;
        let device = UPowerDeviceProxy::builder(connection).path(display_device)?.build().await?;
        Ok(Self { proxy, device })
    }

    pub async fn on_battery(&self) -> bool { self.proxy.on_battery().await.unwrap_or(false) }

    pub async fn percentage(&self) -> Option<f64> { self.device.percentage().await.ok() }

    /// A stream of `OnBattery` property-changed notifications; other
    /// property changes on this proxy MUST NOT be surfaced (§4.6).
    pub async fn on_battery_changed(&self) -> zbus::proxy::PropertyStream<'_, bool> {
        self.proxy.receive_on_battery_changed().await
    }

    /// A stream of display-device `Percentage` property-changed
    /// notifications.
    pub async fn percentage_changed(&self) -> zbus::proxy::PropertyStream<'_, f64> {
        self.device.receive_percentage_changed().await
    }
}
