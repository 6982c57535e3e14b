// ── Device models and product lines ──
//
// A `DeviceModel` is what the user writes in configuration. Every model
// belongs to exactly one `ProductLine`, which selects the codec.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Codec family shared by models with the same wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ProductLine {
    #[strum(to_string = "Delta 2")]
    Delta2,
    #[strum(to_string = "Delta Pro")]
    DeltaPro,
    #[strum(to_string = "Delta Pro 3")]
    DeltaPro3,
    #[strum(to_string = "Smart Plug")]
    SmartPlug,
    #[strum(to_string = "PowerStream")]
    PowerStream,
    #[strum(to_string = "Glacier")]
    Glacier,
    #[strum(to_string = "Wave 2")]
    Wave2,
    #[strum(to_string = "PowerOcean")]
    PowerOcean,
}

/// User-facing device model, parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DeviceModel {
    #[strum(to_string = "Delta 2", serialize = "delta2")]
    Delta2,
    #[strum(to_string = "Delta 2 Max", serialize = "delta2max")]
    Delta2Max,
    #[strum(to_string = "Delta Pro", serialize = "deltapro")]
    DeltaPro,
    #[strum(to_string = "Delta Pro 3", serialize = "deltapro3")]
    DeltaPro3,
    #[strum(to_string = "Delta 3", serialize = "delta3")]
    Delta3,
    #[strum(to_string = "River 2", serialize = "river2")]
    River2,
    #[strum(to_string = "River 2 Max", serialize = "river2max")]
    River2Max,
    #[strum(to_string = "River 2 Pro", serialize = "river2pro")]
    River2Pro,
    #[strum(to_string = "River 3", serialize = "river3")]
    River3,
    #[strum(to_string = "Smart Plug", serialize = "smartplug")]
    SmartPlug,
    #[strum(to_string = "PowerStream", serialize = "power stream")]
    PowerStream,
    #[strum(to_string = "Glacier")]
    Glacier,
    #[strum(to_string = "Wave 2", serialize = "wave2")]
    Wave2,
    #[strum(to_string = "PowerOcean", serialize = "power ocean")]
    PowerOcean,
}

impl DeviceModel {
    pub fn product_line(self) -> ProductLine {
        match self {
            Self::Delta2 | Self::Delta2Max | Self::River2 | Self::River2Max | Self::River2Pro => {
                ProductLine::Delta2
            }
            Self::DeltaPro => ProductLine::DeltaPro,
            Self::DeltaPro3 | Self::Delta3 | Self::River3 => ProductLine::DeltaPro3,
            Self::SmartPlug => ProductLine::SmartPlug,
            Self::PowerStream => ProductLine::PowerStream,
            Self::Glacier => ProductLine::Glacier,
            Self::Wave2 => ProductLine::Wave2,
            Self::PowerOcean => ProductLine::PowerOcean,
        }
    }

    /// Models of a River unit: fixed AC output voltage.
    pub fn is_river(self) -> bool {
        matches!(
            self,
            Self::River2 | Self::River2Max | Self::River2Pro | Self::River3
        )
    }

    /// All models, in declaration order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

impl Serialize for DeviceModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_str(raw.trim()).map_err(|_| {
            serde::de::Error::custom(format!("unknown EcoFlow device model '{raw}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_display_names_case_insensitively() {
        assert_eq!("Delta 2".parse::<DeviceModel>().unwrap(), DeviceModel::Delta2);
        assert_eq!("delta pro 3".parse::<DeviceModel>().unwrap(), DeviceModel::DeltaPro3);
        assert_eq!("SMART PLUG".parse::<DeviceModel>().unwrap(), DeviceModel::SmartPlug);
        assert_eq!("river2max".parse::<DeviceModel>().unwrap(), DeviceModel::River2Max);
        assert!("Delta 9".parse::<DeviceModel>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for model in DeviceModel::all() {
            assert_eq!(model.to_string().parse::<DeviceModel>().unwrap(), model);
        }
    }

    #[test]
    fn product_line_mapping() {
        assert_eq!(DeviceModel::River2Pro.product_line(), ProductLine::Delta2);
        assert_eq!(DeviceModel::River3.product_line(), ProductLine::DeltaPro3);
        assert_eq!(DeviceModel::PowerOcean.product_line(), ProductLine::PowerOcean);
        assert!(DeviceModel::River2.is_river());
        assert!(!DeviceModel::Delta2.is_river());
    }

    #[test]
    fn serde_uses_display_name() {
        let json = serde_json::to_string(&DeviceModel::Wave2).unwrap();
        assert_eq!(json, "\"Wave 2\"");
        let back: DeviceModel = serde_json::from_str("\"wave 2\"").unwrap();
        assert_eq!(back, DeviceModel::Wave2);
        assert!(serde_json::from_str::<DeviceModel>("\"Toaster\"").is_err());
    }
}
