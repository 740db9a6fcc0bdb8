//! Fleet asset models: road vehicles and field machinery.

use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum AssetStatus {
    Active,
    InService,
    Retired,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetStatus::Active => write!(f, "Active"),
            AssetStatus::InService => write!(f, "In Service"),
            AssetStatus::Retired => write!(f, "Retired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Vehicle {
    pub id: i64,
    #[serde(rename = "licensePlate")]
    pub plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    #[serde(rename = "odometerKm")]
    pub odometer_km: Option<i64>,
    pub status: AssetStatus,
}

impl Vehicle {
    /// "Scania R450 (AB-123-CD)" for pickers and list rows.
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.make.as_deref().unwrap_or(""),
            self.model.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            self.plate.clone()
        } else {
            format!("{} ({})", name, self.plate)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct VehiclePayload {
    #[serde(rename = "licensePlate", skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(rename = "odometerKm", skip_serializing_if = "Option::is_none")]
    pub odometer_km: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Machinery {
    pub id: i64,
    pub name: String,
    #[serde(rename = "machineType")]
    pub machine_type: Option<String>,
    #[serde(rename = "serialNumber")]
    pub serial_number: Option<String>,
    #[serde(rename = "hoursUsed")]
    pub hours_used: Option<i64>,
    pub status: AssetStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct MachineryPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "machineType", skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(rename = "serialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(rename = "hoursUsed", skip_serializing_if = "Option::is_none")]
    pub hours_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_display_name() {
        let vehicle: Vehicle = serde_json::from_str(
            r#"{"id": 1, "licensePlate": "AB-123-CD", "make": "Scania", "model": "R450",
                "year": 2021, "odometerKm": 182000, "status": "active"}"#,
        )
        .expect("vehicle parses");
        assert_eq!(vehicle.display_name(), "Scania R450 (AB-123-CD)");
    }

    #[test]
    fn test_vehicle_display_name_falls_back_to_plate() {
        let vehicle: Vehicle = serde_json::from_str(
            r#"{"id": 2, "licensePlate": "ZZ-999-XY", "status": "in_service"}"#,
        )
        .expect("sparse vehicle parses");
        assert_eq!(vehicle.display_name(), "ZZ-999-XY");
        assert_eq!(vehicle.status, AssetStatus::InService);
    }
}
