use bon::Builder;
use sunsink_quantities::Watts;

use crate::core::history::Filter;

/// Controller tunables, immutable for the lifetime of the process.
#[must_use]
#[derive(Copy, Clone, Debug, Builder)]
pub struct Settings {
    /// Start charging or increase the charging power when the filtered power is below.
    #[builder(default = Watts::from(-50))]
    pub power_threshold_min: Watts,

    /// Stop charging or decrease the charging power when the filtered power is above.
    #[builder(default = Watts::from(10))]
    pub power_threshold_max: Watts,

    #[builder(default = Watts::from(25))]
    pub charging_step: Watts,

    /// Maximum aggregate charging power.
    #[builder(default = Watts::from(1500))]
    pub max_charging: Watts,

    /// Number of ticks to wait after a command before acting again.
    #[builder(default = 3)]
    pub locking_time: u32,

    #[builder(default = 7)]
    pub history_size: usize,

    #[builder(default)]
    pub filter: Filter,

    #[builder(default)]
    pub secondary: SecondarySettings,

    /// Discharging is detected when the discharge output draws more than this.
    #[builder(default = Watts::from(10))]
    pub discharge_threshold: Watts,

    /// Suppress increases once the batteries lag behind the setpoint by more than this.
    pub saturation_margin: Option<Watts>,
}

/// Overflow thresholds of the secondary, fixed-power charging path.
#[must_use]
#[derive(Copy, Clone, Debug, Builder)]
pub struct SecondarySettings {
    /// Nominal draw, used until a real one is observed.
    #[builder(default = Watts::from(2000))]
    pub nominal_draw: Watts,

    /// Turn on when the setpoint exceeds the draw by more than this.
    #[builder(default = Watts::from(100))]
    pub on_margin: Watts,

    /// Turn off when the setpoint falls below this.
    #[builder(default = Watts::from(50))]
    pub off_threshold: Watts,

    /// Real draw readings at or below this are unreliable and ignored.
    #[builder(default = Watts::from(100))]
    pub noise_floor: Watts,
}

impl Default for SecondarySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}
