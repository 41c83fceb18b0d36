//! Battery fleet descriptor and per-model command payloads.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sunsink_quantities::Watts;

use crate::prelude::*;

/// EcoFlow batteries reachable over the cloud MQTT broker.
///
/// Example:
/// `{"cid": "ANDROID_123", "batteries": [{"sn": "R331ZEB4ZE123456", "type": "DELTA Max"}]}`.
#[derive(Clone, Deserialize)]
pub struct Fleet {
    /// MQTT client ID issued by the EcoFlow cloud, also a part of the command topics.
    #[serde(rename = "cid")]
    pub client_id: String,

    pub batteries: Vec<Battery>,
}

impl FromStr for Fleet {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let fleet: Self = serde_json::from_str(value).context("invalid battery fleet JSON")?;
        ensure!(!fleet.batteries.is_empty(), "the battery fleet is empty");
        Ok(fleet)
    }
}

#[derive(Clone, Deserialize)]
pub struct Battery {
    #[serde(rename = "sn")]
    pub serial_number: String,

    #[serde(rename = "type")]
    pub model: BatteryModel,

    /// Periodically re-enable the 12V DC output which the battery turns off by itself.
    #[serde(default)]
    pub keep_dc_output: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub enum BatteryModel {
    DeltaMax,
    Delta2,
    Unsupported(String),
}

impl From<String> for BatteryModel {
    fn from(name: String) -> Self {
        if name.eq_ignore_ascii_case("DELTA Max") {
            Self::DeltaMax
        } else if name.eq_ignore_ascii_case("DELTA 2") {
            Self::Delta2
        } else {
            Self::Unsupported(name)
        }
    }
}

impl Display for BatteryModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeltaMax => write!(f, "DELTA Max"),
            Self::Delta2 => write!(f, "DELTA 2"),
            Self::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

impl BatteryModel {
    #[must_use]
    pub fn encoder(&self) -> Option<&'static dyn ChargeCommandEncoder> {
        match self {
            Self::DeltaMax => Some(&DeltaMaxEncoder),
            Self::Delta2 => Some(&Delta2Encoder),
            Self::Unsupported(_) => None,
        }
    }
}

/// Model-specific part of a `thing/property/set` message.
///
/// The channel wraps it into the common envelope.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_type: Option<u8>,

    pub operate_type: &'static str,

    pub params: serde_json::Value,
}

pub trait ChargeCommandEncoder: Sync {
    fn charging_power(&self, power: Watts) -> SetCommand;

    /// Enable or disable the 12V DC output, if the model supports it.
    fn dc_output(&self, _enabled: bool) -> Option<SetCommand> {
        None
    }
}

/// Parameter ID + watt field.
pub struct DeltaMaxEncoder;

impl DeltaMaxEncoder {
    const SLOW_CHARGING_POWER_ID: u8 = 69;
    const DC_OUTPUT_ID: u8 = 81;
}

impl ChargeCommandEncoder for DeltaMaxEncoder {
    fn charging_power(&self, power: Watts) -> SetCommand {
        SetCommand {
            module_type: None,
            operate_type: "TCP",
            params: json!({ "id": Self::SLOW_CHARGING_POWER_ID, "slowChgPower": power.whole() }),
        }
    }

    fn dc_output(&self, enabled: bool) -> Option<SetCommand> {
        Some(SetCommand {
            module_type: None,
            operate_type: "TCP",
            params: json!({ "id": Self::DC_OUTPUT_ID, "enabled": u8::from(enabled) }),
        })
    }
}

/// Named watt field + pause flag.
pub struct Delta2Encoder;

impl Delta2Encoder {
    const INVERTER_MODULE: u8 = 5;
}

impl ChargeCommandEncoder for Delta2Encoder {
    fn charging_power(&self, power: Watts) -> SetCommand {
        let watts = power.whole();
        SetCommand {
            module_type: Some(Self::INVERTER_MODULE),
            operate_type: "acChgCfg",
            params: json!({ "chgWatts": watts, "chgPauseFlag": u8::from(watts == 0) }),
        }
    }

    fn dc_output(&self, enabled: bool) -> Option<SetCommand> {
        Some(SetCommand {
            module_type: Some(Self::INVERTER_MODULE),
            operate_type: "mpptCar",
            params: json!({ "enabled": u8::from(enabled) }),
        })
    }
}
