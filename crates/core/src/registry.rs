use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WattError};
use crate::model::device::Device;

/// Devices and measurements to sync, fixed for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    devices: Vec<Device>,
}

impl Registry {
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        let registry = Self { devices };
        registry.validate()?;
        Ok(registry)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, host: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.host == host)
    }

    /// Every `(device, measurement)` pair in registry order.
    pub fn measurements(&self) -> impl Iterator<Item = (&Device, &str)> {
        self.devices
            .iter()
            .flat_map(|d| d.measurements.iter().map(move |m| (d, m.as_str())))
    }

    pub fn len(&self) -> usize {
        self.devices.iter().map(|d| d.measurements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> Result<()> {
        let mut hosts = HashSet::new();
        for device in &self.devices {
            if device.host.trim().is_empty() {
                return Err(WattError::Config("device host cannot be empty".to_string()));
            }
            if !hosts.insert(device.host.as_str()) {
                return Err(WattError::Config(format!(
                    "device {} listed more than once",
                    device.host
                )));
            }
            let mut seen = HashSet::new();
            for m in &device.measurements {
                if m.trim().is_empty() {
                    return Err(WattError::Config(format!(
                        "empty measurement name on {}",
                        device.host
                    )));
                }
                if !seen.insert(m.as_str()) {
                    return Err(WattError::Config(format!(
                        "measurement {m} listed more than once on {}",
                        device.host
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            devices: vec![
                Device::new(
                    "iwatt5",
                    date(2021, 9, 18),
                    &[
                        "Mains_1",
                        "Mains_2",
                        "SolarA_1",
                        "SolarA_2",
                        "SolarB_1",
                        "SolarB_2",
                        "Garage_1",
                        "Garage_2",
                        "MinisplitGreatAndBlue",
                        "MinisplitBedAndStudio",
                        "EastWall",
                        "BathroomHeat",
                        "OfficeHeat",
                        "Dryer",
                    ],
                ),
                Device::new(
                    "iwatt6",
                    date(2023, 2, 5),
                    &[
                        "Office",
                        "Furnace",
                        "OGMaker",
                        "LaundryFoyerMaker",
                        "GreatroomSouthTV",
                        "Datacenter",
                        "BlueAndBreeze",
                        "StudioA",
                        "Freezers",
                        "Bedroom",
                        "StudioASouth",
                        "Dishwasher",
                        "Washer",
                        "Fridge",
                    ],
                ),
            ],
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
