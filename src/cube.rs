//! BLE connection scope for the Timeular cube.
//!
//! Scans for the configured address, connects, logs the device-information
//! characteristics once, then feeds orientation notifications (one byte per
//! notification) to the router until the peripheral disconnects or the
//! daemon shuts down.

use anyhow::{anyhow, Context as _, Result};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::router::{DescriptionPrompt, Router};
use crate::tracker::api::ActivityApi;

/// Timeular's orientation characteristic. One byte per notification:
/// 0 = flat / in motion, 1–8 = that face up.
pub const ORIENTATION_UUID: Uuid = Uuid::from_u128(0xc7e70012_c847_11e6_8175_8c89a55d403c);

/// Standard GATT device-information characteristics, read once at connect
/// time for the log. Purely informational.
const DEVICE_INFO_UUIDS: [(&str, Uuid); 6] = [
    ("model number", Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb)),
    ("serial number", Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb)),
    ("firmware revision", Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb)),
    ("hardware revision", Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb)),
    ("software revision", Uuid::from_u128(0x00002a28_0000_1000_8000_00805f9b34fb)),
    ("manufacturer", Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb)),
];

const SCAN_ROUND: Duration = Duration::from_secs(2);

/// Connect to the cube and pump orientation notifications into the router.
///
/// Returns only on error: a closed notification stream means the peripheral
/// disconnected, which is fatal to the run loop — the process exits and
/// external supervision restarts it.
pub async fn run<A: ActivityApi, P: DescriptionPrompt>(
    address: &str,
    router: &Router<A, P>,
) -> Result<()> {
    let manager = Manager::new().await?;
    let central = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no Bluetooth adapter found"))?;

    info!(address, "scanning for cube");
    central.start_scan(ScanFilter::default()).await?;
    let device = find_cube(&central, address).await?;
    central.stop_scan().await?;

    device.connect().await.context("connecting to cube")?;
    device
        .discover_services()
        .await
        .context("discovering services")?;
    info!(address, "connected");

    log_device_information(&device).await;

    let orientation = device
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == ORIENTATION_UUID)
        .ok_or_else(|| anyhow!("peripheral has no orientation characteristic — not a Timeular cube?"))?;
    device
        .subscribe(&orientation)
        .await
        .context("subscribing to orientation notifications")?;
    info!("subscribed to orientation notifications");

    let mut notifications = device.notifications().await?;
    while let Some(notification) = notifications.next().await {
        if notification.uuid != ORIENTATION_UUID {
            continue;
        }
        let Some(&face) = notification.value.first() else {
            warn!("empty orientation notification");
            continue;
        };
        if notification.value.len() != 1 {
            warn!(len = notification.value.len(), "oversized orientation notification — using first byte");
        }
        match router.on_orientation(face).await {
            Ok(outcome) => debug!(face, ?outcome, "notification handled"),
            // A failed start is this pass's problem only; the stop already
            // ran, so local state is accurate and the loop keeps going.
            Err(e) => error!(face, err = %e, "could not start activity"),
        }
    }

    Err(anyhow!("cube disconnected"))
}

/// Keep scanning until a peripheral with the configured address shows up.
async fn find_cube(central: &Adapter, address: &str) -> Result<Peripheral> {
    loop {
        tokio::time::sleep(SCAN_ROUND).await;
        let peripherals = central.peripherals().await?;
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            if props.address.to_string().eq_ignore_ascii_case(address) {
                let name = props.local_name.as_deref().unwrap_or("<no name>");
                info!(address, name, "found cube");
                return Ok(peripheral);
            }
        }
        debug!(address, "cube not seen yet — still scanning");
    }
}

/// Read and log the six standard device-information characteristics.
/// Missing characteristics are skipped — this never fails the connection.
async fn log_device_information(device: &Peripheral) {
    let characteristics = device.characteristics();
    for (label, uuid) in DEVICE_INFO_UUIDS {
        let Some(characteristic) = characteristics.iter().find(|c| c.uuid == uuid) else {
            continue;
        };
        match device.read(characteristic).await {
            Ok(value) => {
                let text = String::from_utf8_lossy(&value);
                info!("{label}: {}", text.trim_end_matches('\0'));
            }
            Err(e) => debug!(label, err = %e, "device information read failed"),
        }
    }
}
