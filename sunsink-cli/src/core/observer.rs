//! Low-priority auxiliary polls, one at a time.

use std::collections::BTreeMap;

use sunsink_quantities::Watts;

use crate::{
    core::{
        gateway::{Device, Gateway},
        settings::Settings,
        state_of_charge::BatteryCharge,
    },
    prelude::*,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Poll {
    /// Detect discharging by the output switch power.
    Discharge,

    /// Refresh the real draw of the secondary charging path.
    SecondaryDraw,

    /// Refresh the real draw of the batteries, for the saturation guard.
    PrimaryDraw,
}

impl Poll {
    #[must_use]
    pub const fn device(self) -> Device {
        match self {
            Self::Discharge => Device::DischargeOut,
            Self::SecondaryDraw => Device::SecondaryIn,
            Self::PrimaryDraw => Device::PrimaryIn,
        }
    }
}

/// Signals refreshed by the observer and consumed by the decision engine.
#[derive(Default)]
pub struct AuxSignals {
    pub discharging: bool,

    /// Last reported charge by battery serial number.
    pub state_of_charge: BTreeMap<String, BatteryCharge>,
}

/// Round-robin poll schedule.
pub struct Observer {
    polls: Vec<Poll>,
    cursor: usize,
    in_flight: bool,
}

impl Observer {
    pub fn new(settings: &Settings, gateway: &Gateway) -> Self {
        let polls = [Poll::Discharge, Poll::SecondaryDraw, Poll::PrimaryDraw]
            .into_iter()
            .filter(|poll| gateway.get(poll.device()).is_some())
            .filter(|poll| *poll != Poll::PrimaryDraw || settings.saturation_margin.is_some())
            .collect();
        Self { polls, cursor: 0, in_flight: false }
    }

    /// Next poll to issue, unless the previous one is still outstanding.
    pub fn next_poll(&mut self) -> Option<Poll> {
        if self.in_flight {
            debug!("auxiliary poll is still in flight");
            return None;
        }
        let poll = *self.polls.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.polls.len();
        self.in_flight = true;
        Some(poll)
    }

    /// Apply the polled real power.
    pub fn complete(
        &mut self,
        poll: Poll,
        result: Result<Watts>,
        settings: &Settings,
        gateway: &mut Gateway,
        signals: &mut AuxSignals,
    ) {
        self.in_flight = false;
        let power = match result {
            Ok(power) => power,
            Err(error) => {
                warn!(?poll, "poll failed: {error:#}");
                return;
            }
        };
        match poll {
            Poll::Discharge => {
                let discharging = power > settings.discharge_threshold;
                if discharging != signals.discharging {
                    info!(?power, discharging, "discharging state changed");
                }
                signals.discharging = discharging;
            }
            Poll::SecondaryDraw => {
                if power > settings.secondary.noise_floor
                    && let Some(state) = gateway.get_mut(Device::SecondaryIn)
                {
                    debug!(?power, "secondary draw");
                    state.last_known_draw = Some(power);
                } else {
                    debug!(?power, "secondary draw is below the noise floor, ignoring");
                }
            }
            Poll::PrimaryDraw => {
                if let Some(state) = gateway.get_mut(Device::PrimaryIn) {
                    debug!(?power, "primary draw");
                    state.last_known_draw = Some(power);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_one_at_a_time() {
        let settings = Settings::builder().saturation_margin(Watts::from(1000)).build();
        let mut gateway = Gateway::new(true, true);
        let mut signals = AuxSignals::default();
        let mut observer = Observer::new(&settings, &gateway);

        let mut issued = Vec::new();
        for _ in 0..4 {
            let poll = observer.next_poll();
            assert_eq!(observer.next_poll(), None, "only one poll may be in flight");
            let Some(poll) = poll else { panic!("expected a poll") };
            issued.push(poll);
            observer.complete(poll, Ok(Watts::ZERO), &settings, &mut gateway, &mut signals);
        }
        assert_eq!(
            issued,
            [Poll::Discharge, Poll::SecondaryDraw, Poll::PrimaryDraw, Poll::Discharge],
        );
    }

    #[test]
    fn no_polls_without_auxiliary_devices() {
        let settings = Settings::default();
        let gateway = Gateway::new(false, false);
        let mut observer = Observer::new(&settings, &gateway);
        assert_eq!(observer.next_poll(), None);
    }

    #[test]
    fn discharge_threshold() {
        let settings = Settings::default();
        let mut gateway = Gateway::new(false, true);
        let mut signals = AuxSignals::default();
        let mut observer = Observer::new(&settings, &gateway);

        for (power, expected) in [(11, true), (10, false), (250, true), (0, false)] {
            let poll = observer.next_poll();
            assert_eq!(poll, Some(Poll::Discharge));
            observer.complete(
                Poll::Discharge,
                Ok(Watts::from(power)),
                &settings,
                &mut gateway,
                &mut signals,
            );
            assert_eq!(signals.discharging, expected, "{power}");
        }
    }

    #[test]
    fn secondary_draw_noise_floor() {
        let settings = Settings::default();
        let mut gateway = Gateway::new(true, false);
        let mut signals = AuxSignals::default();
        let mut observer = Observer::new(&settings, &gateway);
        let last_known_draw = |gateway: &Gateway| {
            gateway.get(Device::SecondaryIn).and_then(|state| state.last_known_draw)
        };

        let _ = observer.next_poll();
        observer.complete(
            Poll::SecondaryDraw,
            Ok(Watts::from(1380)),
            &settings,
            &mut gateway,
            &mut signals,
        );
        assert_eq!(last_known_draw(&gateway), Some(Watts::from(1380)));

        let _ = observer.next_poll();
        observer.complete(
            Poll::SecondaryDraw,
            Ok(Watts::from(100)),
            &settings,
            &mut gateway,
            &mut signals,
        );
        assert_eq!(last_known_draw(&gateway), Some(Watts::from(1380)));
    }

    #[test]
    fn failed_poll_keeps_the_signals() {
        let settings = Settings::default();
        let mut gateway = Gateway::new(false, true);
        let mut signals = AuxSignals { discharging: true, ..AuxSignals::default() };
        let mut observer = Observer::new(&settings, &gateway);

        let _ = observer.next_poll();
        observer.complete(
            Poll::Discharge,
            Err(anyhow::anyhow!("timeout")),
            &settings,
            &mut gateway,
            &mut signals,
        );
        assert!(signals.discharging);
        assert_eq!(observer.next_poll(), Some(Poll::Discharge));
    }
}
