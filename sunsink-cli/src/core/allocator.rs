//! Splits the aggregate charging setpoint between the primary and the secondary charging paths.

use sunsink_quantities::Watts;

use crate::core::{
    gateway::{Device, Gateway},
    settings::Settings,
    state::ControlState,
};

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// The quantized setpoint is already in effect.
    Unchanged,

    /// The requested primary share is far above what the batteries actually draw,
    /// most likely they are full.
    Saturated { primary_share: Watts, draw: Watts },

    Planned(AllocationPlan),
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationPlan {
    /// New aggregate setpoint.
    pub setpoint: Watts,

    /// Charging power for each battery on the primary path.
    pub primary_share: Watts,

    /// Requested secondary switch state, if it should change.
    pub secondary: Option<bool>,
}

pub struct Allocator<'a> {
    pub settings: &'a Settings,
    pub state: &'a ControlState,
    pub gateway: &'a Gateway,
}

impl Allocator<'_> {
    /// Quantize the requested aggregate power and split it between the charging paths.
    pub fn plan(&self, requested: Watts) -> Allocation {
        let step = self.settings.charging_step;
        let max_setpoint = self.settings.max_charging.floor_to(step);
        let setpoint = requested.floor_to(step).clamp(Watts::ZERO, max_setpoint);
        if setpoint == self.state.setpoint {
            return Allocation::Unchanged;
        }

        let mut primary_share = setpoint;
        let mut secondary = None;
        if let Some(state) = self.gateway.get(Device::SecondaryIn) {
            let settings = &self.settings.secondary;
            let draw = state.last_known_draw.unwrap_or(settings.nominal_draw);
            if !state.on && setpoint > draw + settings.on_margin {
                // Overflow onto the secondary path:
                secondary = Some(true);
                primary_share -= draw;
            } else if state.on && setpoint < settings.off_threshold {
                // Everything fits on the primary path again:
                secondary = Some(false);
            } else if state.on {
                primary_share -= draw;
            }
        }
        let primary_share = primary_share.max(Watts::ZERO).floor_to(step);

        // Only increases over an already issued share are checked, the draw means nothing before:
        let primary_draw =
            self.gateway.get(Device::PrimaryIn).and_then(|state| state.last_known_draw);
        if let Some(margin) = self.settings.saturation_margin
            && let Some(draw) = primary_draw
            && self.state.primary_share > Watts::ZERO
            && primary_share > self.state.primary_share
            && primary_share > draw + margin
        {
            return Allocation::Saturated { primary_share, draw };
        }

        Allocation::Planned(AllocationPlan { setpoint, primary_share, secondary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::SecondarySettings;

    fn settings() -> Settings {
        Settings::builder()
            .charging_step(Watts::from(50))
            .max_charging(Watts::from(3000))
            .secondary(SecondarySettings::builder().nominal_draw(Watts::from(2000)).build())
            .build()
    }

    /// Secondary path with an observed draw.
    fn secondary_gateway(draw: i32, on: bool) -> Gateway {
        let mut gateway = Gateway::new(true, false);
        gateway.synchronize(Device::SecondaryIn, on);
        if let Some(secondary) = gateway.get_mut(Device::SecondaryIn) {
            secondary.last_known_draw = Some(Watts::from(draw));
        }
        gateway
    }

    fn primary_gateway(draw: i32) -> Gateway {
        let mut gateway = Gateway::new(false, false);
        if let Some(primary) = gateway.get_mut(Device::PrimaryIn) {
            primary.last_known_draw = Some(Watts::from(draw));
        }
        gateway
    }

    fn charging_at(setpoint: i32) -> ControlState {
        ControlState {
            charging: true,
            setpoint: Watts::from(setpoint),
            primary_share: Watts::from(setpoint),
            ..ControlState::default()
        }
    }

    #[test]
    fn quantizes_and_clamps() {
        let settings = Settings::builder()
            .charging_step(Watts::from(50))
            .max_charging(Watts::from(1500))
            .build();
        let state = ControlState::default();
        let gateway = Gateway::new(false, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };

        for (requested, expected) in [(149, 100), (1499, 1450), (1600, 1500), (-80, 0)] {
            let expected = if expected == 0 {
                Allocation::Unchanged
            } else {
                Allocation::Planned(AllocationPlan {
                    setpoint: Watts::from(expected),
                    primary_share: Watts::from(expected),
                    secondary: None,
                })
            };
            assert_eq!(allocator.plan(Watts::from(requested)), expected, "{requested}");
        }
    }

    #[test]
    fn quantized_setpoints_are_multiples_of_the_step() {
        let settings = Settings::builder()
            .charging_step(Watts::from(25))
            .max_charging(Watts::from(1500))
            .build();
        let state = ControlState::default();
        let gateway = Gateway::new(false, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };

        for requested in (-500..2500).step_by(7) {
            if let Allocation::Planned(plan) = allocator.plan(Watts::from(requested)) {
                assert!(plan.setpoint >= Watts::ZERO);
                assert!(plan.setpoint <= settings.max_charging);
                assert_eq!(plan.setpoint.floor_to(settings.charging_step), plan.setpoint);
            }
        }
    }

    #[test]
    fn same_setpoint_is_unchanged() {
        let settings = settings();
        let state = charging_at(500);
        let gateway = Gateway::new(false, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(allocator.plan(Watts::from(530)), Allocation::Unchanged);
    }

    /// Below the overflow threshold, the secondary stays off.
    #[test]
    fn scenario_c_secondary_stays_off() {
        let settings = settings();
        let state = charging_at(500);
        let gateway = secondary_gateway(2000, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(1450)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::from(1450),
                primary_share: Watts::from(1450),
                secondary: None,
            }),
        );
    }

    /// Above the overflow threshold, the secondary takes its real draw off the primary.
    #[test]
    fn scenario_d_overflow_onto_secondary() {
        let settings = settings();
        let state = charging_at(700);
        let gateway = secondary_gateway(1400, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(1600)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::from(1600),
                primary_share: Watts::from(200),
                secondary: Some(true),
            }),
        );
    }

    #[test]
    fn secondary_share_is_kept_while_on() {
        let settings = settings();
        let state = ControlState {
            primary_share: Watts::from(200),
            ..charging_at(1600)
        };
        let gateway = secondary_gateway(1400, true);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(1000)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::from(1000),
                primary_share: Watts::ZERO,
                secondary: None,
            }),
        );
    }

    #[test]
    fn overflow_out_below_the_low_water_mark() {
        let settings = settings();
        let state = ControlState { primary_share: Watts::ZERO, ..charging_at(1400) };
        let gateway = secondary_gateway(1400, true);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(20)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::ZERO,
                primary_share: Watts::ZERO,
                secondary: Some(false),
            }),
        );
    }

    #[test]
    fn nominal_draw_is_used_until_observed() {
        let settings = settings();
        let state = charging_at(700);
        let gateway = Gateway::new(true, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };

        // 1600 W does not exceed the nominal 2000 W plus the margin:
        assert!(matches!(
            allocator.plan(Watts::from(1600)),
            Allocation::Planned(AllocationPlan { secondary: None, .. }),
        ));
        assert_eq!(
            allocator.plan(Watts::from(2150)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::from(2150),
                primary_share: Watts::from(150),
                secondary: Some(true),
            }),
        );
    }

    #[test]
    fn max_charging_is_quantized_too() {
        let settings = Settings::builder()
            .charging_step(Watts::from(25))
            .max_charging(Watts::from(1510))
            .build();
        let state = ControlState::default();
        let gateway = Gateway::new(false, false);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(2000)),
            Allocation::Planned(AllocationPlan {
                setpoint: Watts::from(1500),
                primary_share: Watts::from(1500),
                secondary: None,
            }),
        );
    }

    #[test]
    fn saturated_battery_suppresses_increase() {
        let settings = Settings::builder()
            .charging_step(Watts::from(50))
            .saturation_margin(Watts::from(1000))
            .build();
        let state = charging_at(1200);
        let gateway = primary_gateway(30);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(1400)),
            Allocation::Saturated { primary_share: Watts::from(1400), draw: Watts::from(30) },
        );

        // Decreasing is always allowed:
        assert!(matches!(allocator.plan(Watts::from(600)), Allocation::Planned(_)));
    }

    #[test]
    fn saturation_guard_checks_the_requested_share() {
        let settings = Settings::builder()
            .charging_step(Watts::from(50))
            .saturation_margin(Watts::from(1000))
            .build();
        let state = charging_at(100);

        let gateway = primary_gateway(0);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert_eq!(
            allocator.plan(Watts::from(1400)),
            Allocation::Saturated { primary_share: Watts::from(1400), draw: Watts::ZERO },
        );

        let gateway = primary_gateway(100);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert!(matches!(allocator.plan(Watts::from(1100)), Allocation::Planned(_)));
        assert!(matches!(allocator.plan(Watts::from(1150)), Allocation::Saturated { .. }));
    }

    #[test]
    fn saturation_guard_does_not_block_the_start() {
        let settings = Settings::builder()
            .charging_step(Watts::from(50))
            .saturation_margin(Watts::from(1000))
            .build();
        let state = charging_at(0);
        let gateway = primary_gateway(0);
        let allocator = Allocator { settings: &settings, state: &state, gateway: &gateway };
        assert!(matches!(allocator.plan(Watts::from(1400)), Allocation::Planned(_)));
    }
}
