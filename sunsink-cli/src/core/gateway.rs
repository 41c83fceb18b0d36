//! Logical actuator state with one outstanding command per switch.

use std::fmt::{Display, Formatter};

use sunsink_quantities::Watts;

use crate::{core::battery::SetCommand, prelude::*};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Device {
    /// Switch feeding the batteries' AC chargers.
    PrimaryIn,

    /// Independently switched, fixed-power charging path.
    SecondaryIn,

    /// Switch on the batteries' output, used to detect discharging.
    DischargeOut,
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryIn => write!(f, "primary charger"),
            Self::SecondaryIn => write!(f, "secondary charger"),
            Self::DischargeOut => write!(f, "discharge output"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ActuatorState {
    /// Last confirmed switch state.
    pub on: bool,

    pub in_flight: bool,

    /// Last trusted real power draw, if any has been observed yet.
    pub last_known_draw: Option<Watts>,
}

/// Outbound action for the runner to perform.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Switch { device: Device, on: bool },
    Publish { serial_number: String, command: SetCommand },
}

pub struct Gateway {
    primary: ActuatorState,
    secondary: Option<ActuatorState>,
    discharge: Option<ActuatorState>,
}

impl Gateway {
    pub fn new(has_secondary: bool, has_discharge_output: bool) -> Self {
        Self {
            primary: ActuatorState::default(),
            secondary: has_secondary.then(ActuatorState::default),
            discharge: has_discharge_output.then(ActuatorState::default),
        }
    }

    #[must_use]
    pub const fn get(&self, device: Device) -> Option<&ActuatorState> {
        match device {
            Device::PrimaryIn => Some(&self.primary),
            Device::SecondaryIn => self.secondary.as_ref(),
            Device::DischargeOut => self.discharge.as_ref(),
        }
    }

    pub const fn get_mut(&mut self, device: Device) -> Option<&mut ActuatorState> {
        match device {
            Device::PrimaryIn => Some(&mut self.primary),
            Device::SecondaryIn => self.secondary.as_mut(),
            Device::DischargeOut => self.discharge.as_mut(),
        }
    }

    #[must_use]
    pub fn is_on(&self, device: Device) -> bool {
        self.get(device).is_some_and(|state| state.on)
    }

    /// Issue the switch command unless another one is still outstanding for the device.
    #[must_use]
    pub fn request_switch(&mut self, device: Device, on: bool) -> Option<Command> {
        let Some(state) = self.get_mut(device) else {
            warn!(%device, "the device is not configured");
            return None;
        };
        if state.in_flight {
            debug!(%device, on, "another command is in flight, dropping");
            return None;
        }
        state.in_flight = true;
        info!(%device, on, "switching…");
        Some(Command::Switch { device, on })
    }

    /// Apply the switch outcome and return the notification text.
    ///
    /// On success, `result` holds the previous switch state.
    pub fn complete_switch(&mut self, device: Device, on: bool, result: Result<bool>) -> String {
        let Some(state) = self.get_mut(device) else {
            return format!("Unexpected reply from {device}.");
        };
        state.in_flight = false;
        let verb = if on { "on" } else { "off" };
        match result {
            Ok(was_on) => {
                info!(%device, was_on, on, "switched");
                state.on = on;
                format!("Switched {device} {verb}.")
            }
            Err(error) => {
                warn!(%device, on, "failed to switch: {error:#}");
                format!("Switching {device} {verb} failed.")
            }
        }
    }

    /// Seed the logical state from the actual switch output at startup.
    pub fn synchronize(&mut self, device: Device, on: bool) {
        if let Some(state) = self.get_mut(device) {
            state.on = on;
        }
    }
}
