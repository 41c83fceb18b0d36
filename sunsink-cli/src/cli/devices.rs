//! Shelly device addresses.

use std::sync::Arc;

use clap::Parser;
use reqwest::Url;

use crate::{
    api::{
        Switch,
        shelly::{self, Phase},
    },
    prelude::*,
    runner::Switches,
};

#[must_use]
#[derive(Parser)]
pub struct DeviceArgs {
    /// Shelly Pro 3EM base URL, for example: `http://192.168.1.10`.
    #[clap(long = "meter-url", env = "METER_URL")]
    pub meter_url: Url,

    /// Meter phase to balance.
    #[clap(long = "phase", env = "METER_PHASE", value_enum, default_value_t = Phase::B)]
    pub phase: Phase,

    /// Switch feeding the batteries' AC chargers.
    #[clap(long = "primary-switch-url", env = "PRIMARY_SWITCH_URL")]
    pub primary_switch_url: Url,

    /// Switch of the optional fixed-power secondary charger.
    #[clap(long = "secondary-switch-url", env = "SECONDARY_SWITCH_URL")]
    pub secondary_switch_url: Option<Url>,

    /// Switch on the batteries' output, used to detect discharging.
    #[clap(long = "discharge-switch-url", env = "DISCHARGE_SWITCH_URL")]
    pub discharge_switch_url: Option<Url>,
}

impl DeviceArgs {
    pub fn meter(&self) -> Result<shelly::EnergyMeter> {
        Ok(shelly::EnergyMeter::new(shelly::Client::new(self.meter_url.clone())?, self.phase))
    }

    pub fn switches(&self) -> Result<Switches> {
        let connect = |url: &Url| -> Result<Arc<dyn Switch>> {
            Ok(Arc::new(shelly::Client::new(url.clone())?))
        };
        Ok(Switches {
            primary: connect(&self.primary_switch_url)?,
            secondary: self.secondary_switch_url.as_ref().map(connect).transpose()?,
            discharge: self.discharge_switch_url.as_ref().map(connect).transpose()?,
        })
    }
}
