// ── Typed status view ──
//
// Product-line independent summary built from a quota snapshot by the
// device's codec. Every field is optional: unknown until reported.

use serde::Serialize;

use super::snapshot::EnableType;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceStatus {
    pub battery_level: Option<f64>,
    pub input_watts: Option<f64>,
    pub output_watts: Option<f64>,
    pub ac_enabled: Option<EnableType>,
    pub xboost_enabled: Option<EnableType>,
    pub dc_enabled: Option<EnableType>,
    pub usb_enabled: Option<EnableType>,
    pub switch_on: Option<EnableType>,
    pub brightness_percent: Option<u8>,
    pub charge_limit: Option<u8>,
    pub discharge_limit: Option<u8>,
    pub temperature: Option<f64>,
    pub target_temperature: Option<f64>,
}

impl DeviceStatus {
    /// `(label, rendered value)` pairs for the fields that are known.
    pub fn known_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        let mut push = |label: &'static str, value: Option<String>| {
            if let Some(value) = value {
                fields.push((label, value));
            }
        };

        push("Battery", self.battery_level.map(|v| format!("{v:.0}%")));
        push("Input", self.input_watts.map(|v| format!("{v:.0} W")));
        push("Output", self.output_watts.map(|v| format!("{v:.0} W")));
        push("AC", self.ac_enabled.map(|v| v.to_string()));
        push("X-Boost", self.xboost_enabled.map(|v| v.to_string()));
        push("DC", self.dc_enabled.map(|v| v.to_string()));
        push("USB", self.usb_enabled.map(|v| v.to_string()));
        push("Switch", self.switch_on.map(|v| v.to_string()));
        push("Brightness", self.brightness_percent.map(|v| format!("{v}%")));
        push("Charge limit", self.charge_limit.map(|v| format!("{v}%")));
        push("Discharge limit", self.discharge_limit.map(|v| format!("{v}%")));
        push("Temperature", self.temperature.map(|v| format!("{v:.1} °C")));
        push("Target", self.target_temperature.map(|v| format!("{v:.1} °C")));
        fields
    }
}
