//! Controller tunables.

use clap::Parser;
use sunsink_quantities::Watts;

use crate::core::{
    history::Filter,
    settings::{SecondarySettings, Settings},
};

#[must_use]
#[derive(Parser)]
pub struct ControlArgs {
    /// Meter polling interval, also the controller tick.
    #[clap(long = "interval", env = "INTERVAL", default_value = "10s")]
    pub interval: humantime::Duration,

    /// Start charging or increase the charging power below this filtered grid power.
    #[clap(
        long = "power-threshold-min",
        env = "POWER_THRESHOLD_MIN",
        default_value = "-50",
        allow_negative_numbers = true
    )]
    pub power_threshold_min: Watts,

    /// Stop charging or decrease the charging power above this filtered grid power.
    #[clap(
        long = "power-threshold-max",
        env = "POWER_THRESHOLD_MAX",
        default_value = "10",
        allow_negative_numbers = true
    )]
    pub power_threshold_max: Watts,

    /// Charging power granularity.
    #[clap(long = "charging-step", env = "CHARGING_STEP", default_value = "25")]
    pub charging_step: Watts,

    /// Maximum aggregate charging power.
    #[clap(long = "max-charging", env = "MAX_CHARGING", default_value = "1500")]
    pub max_charging: Watts,

    /// Number of ticks to wait after a command before acting again.
    #[clap(long = "locking-time", env = "LOCKING_TIME", default_value = "3")]
    pub locking_time: u32,

    /// Number of the latest samples to filter.
    #[clap(long = "history-size", env = "HISTORY_SIZE", default_value = "7")]
    pub history_size: usize,

    #[clap(long = "filter", env = "FILTER", value_enum, default_value_t = Filter::Median)]
    pub filter: Filter,

    /// Discharging is detected when the discharge output draws more than this.
    #[clap(long = "discharge-threshold", env = "DISCHARGE_THRESHOLD", default_value = "10")]
    pub discharge_threshold: Watts,

    /// Hold the charging power once the batteries draw this much less than requested.
    #[clap(long = "saturation-margin", env = "SATURATION_MARGIN")]
    pub saturation_margin: Option<Watts>,

    #[clap(flatten)]
    pub secondary: SecondaryArgs,

    /// State of charge collection interval.
    #[clap(
        long = "state-of-charge-interval",
        env = "STATE_OF_CHARGE_INTERVAL",
        default_value = "5min"
    )]
    pub state_of_charge_interval: humantime::Duration,

    /// Periodically re-enable the batteries' DC output.
    #[clap(long = "dc-output-interval", env = "DC_OUTPUT_INTERVAL")]
    pub dc_output_interval: Option<humantime::Duration>,
}

impl ControlArgs {
    pub fn settings(&self) -> Settings {
        Settings::builder()
            .power_threshold_min(self.power_threshold_min)
            .power_threshold_max(self.power_threshold_max)
            .charging_step(self.charging_step)
            .max_charging(self.max_charging)
            .locking_time(self.locking_time)
            .history_size(self.history_size)
            .filter(self.filter)
            .discharge_threshold(self.discharge_threshold)
            .maybe_saturation_margin(self.saturation_margin)
            .secondary(self.secondary.settings())
            .build()
    }
}

#[must_use]
#[derive(Parser)]
pub struct SecondaryArgs {
    /// Nominal draw of the secondary charger, used until a real one is observed.
    #[clap(long = "secondary-nominal-draw", env = "SECONDARY_NOMINAL_DRAW", default_value = "2000")]
    pub nominal_draw: Watts,

    /// Turn the secondary charger on when the setpoint exceeds its draw by more than this.
    #[clap(long = "secondary-on-margin", env = "SECONDARY_ON_MARGIN", default_value = "100")]
    pub on_margin: Watts,

    /// Turn the secondary charger off when the setpoint falls below this.
    #[clap(long = "secondary-off-threshold", env = "SECONDARY_OFF_THRESHOLD", default_value = "50")]
    pub off_threshold: Watts,

    /// Secondary draw readings at or below this are ignored.
    #[clap(long = "secondary-noise-floor", env = "SECONDARY_NOISE_FLOOR", default_value = "100")]
    pub noise_floor: Watts,
}

impl SecondaryArgs {
    pub fn settings(&self) -> SecondarySettings {
        SecondarySettings::builder()
            .nominal_draw(self.nominal_draw)
            .on_margin(self.on_margin)
            .off_threshold(self.off_threshold)
            .noise_floor(self.noise_floor)
            .build()
    }
}
