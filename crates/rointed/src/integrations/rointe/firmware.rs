use tracing::warn;

use super::api::DeviceRecord;
use super::api::FirmwareMap;

/// Product key used by the firmware map
pub fn product_key(device_type: &str, product_version: &str) -> String {
    format!("{}_{}", device_type, product_version)
}

/// Work out the newest firmware available for a device.
///
/// Returns `None` when the record lacks type, version or installed firmware.
/// When the map has no upgrade path for the installed version, the installed
/// version is the latest.
pub fn determine_latest_firmware(record: &DeviceRecord, map: &FirmwareMap) -> Option<String> {
    let data = &record.data;
    let current = record.firmware.firmware_version_device.as_deref();

    let current = match current {
        Some(c) if !data.device_type.is_empty() && !data.product_version.is_empty() => c,
        _ => {
            warn!(
                "[rointe] Unable to determine latest firmware for [{}][{}] at v[{:?}]",
                data.device_type, data.product_version, current
            );
            return None;
        }
    };

    let product = product_key(&data.device_type, &data.product_version);
    match map.get(&product).and_then(|paths| paths.get(current)) {
        Some(latest) => Some(latest.clone()),
        None => Some(current.to_string()),
    }
}
