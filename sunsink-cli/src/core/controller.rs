//! Hysteresis decision engine: owns the whole control state and turns samples into commands.

use bon::bon;
use itertools::Itertools;
use sunsink_quantities::Watts;

use crate::{
    core::{
        allocator::{Allocation, AllocationPlan, Allocator},
        battery::Fleet,
        gateway::{Command, Device, Gateway},
        history::PowerHistory,
        observer::{AuxSignals, Observer, Poll},
        settings::Settings,
        state::ControlState,
        state_of_charge::StateOfChargeCollector,
    },
    prelude::*,
};

pub struct Controller {
    settings: Settings,
    fleet: Fleet,
    history: PowerHistory,
    state: ControlState,
    gateway: Gateway,
    observer: Observer,
    signals: AuxSignals,
    state_of_charge: StateOfChargeCollector,
}

#[bon]
impl Controller {
    #[builder]
    pub fn new(
        settings: Settings,
        fleet: Fleet,
        #[builder(default)] has_secondary: bool,
        #[builder(default)] has_discharge_output: bool,
    ) -> Result<Self> {
        let history = PowerHistory::new(settings.history_size)?;
        let gateway = Gateway::new(has_secondary, has_discharge_output);
        let observer = Observer::new(&settings, &gateway);
        Ok(Self {
            settings,
            fleet,
            history,
            state: ControlState::default(),
            gateway,
            observer,
            signals: AuxSignals::default(),
            state_of_charge: StateOfChargeCollector::default(),
        })
    }
}

impl Controller {
    #[must_use]
    pub const fn state(&self) -> &ControlState {
        &self.state
    }

    #[must_use]
    pub const fn signals(&self) -> &AuxSignals {
        &self.signals
    }

    /// Push the sample into the history and count the lock down, once per tick.
    pub fn write_sample(&mut self, power: Watts) {
        self.history.push(power);
        self.state.lock.tick();
    }

    /// Process a fresh meter reading and decide what to do.
    #[instrument(skip_all, fields(power = ?power))]
    pub fn on_sample(&mut self, power: Watts, is_channel_connected: bool) -> Vec<Command> {
        self.write_sample(power);
        let filtered = self.history.filtered(self.settings.filter);
        info!(
            ?filtered,
            charging = self.state.charging,
            setpoint = ?self.state.setpoint,
            lock = self.state.lock.remaining(),
        );

        if self.state.lock.is_locked() {
            return Vec::new();
        }
        if !self.state.charging {
            if filtered < self.settings.power_threshold_min {
                return self.start_charging();
            }
            return Vec::new();
        }
        if filtered > self.settings.power_threshold_max && self.state.setpoint == Watts::ZERO {
            return self.stop_charging();
        }
        if filtered < self.settings.power_threshold_min
            || filtered > self.settings.power_threshold_max
        {
            return self.adjust(self.state.setpoint - filtered, is_channel_connected);
        }
        Vec::new()
    }

    fn start_charging(&mut self) -> Vec<Command> {
        if self.signals.discharging {
            info!("surplus detected, but the batteries are discharging");
            return Vec::new();
        }
        if self.is_fleet_full() {
            info!("surplus detected, but the batteries are full");
            return Vec::new();
        }
        info!("starting to charge…");
        let commands =
            self.gateway.request_switch(Device::PrimaryIn, true).into_iter().collect_vec();
        if !commands.is_empty() {
            self.state.lock.arm(self.settings.locking_time);
        }
        commands
    }

    /// Every battery reported a full master pack in the latest state-of-charge round.
    fn is_fleet_full(&self) -> bool {
        !self.fleet.batteries.is_empty()
            && self.fleet.batteries.iter().all(|battery| {
                self.signals
                    .state_of_charge
                    .get(&battery.serial_number)
                    .is_some_and(|charge| charge.master.is_full())
            })
    }

    fn stop_charging(&mut self) -> Vec<Command> {
        info!("stopping to charge…");
        let mut commands = Vec::new();
        if self.gateway.is_on(Device::SecondaryIn) {
            commands.extend(self.gateway.request_switch(Device::SecondaryIn, false));
        }
        commands.extend(self.gateway.request_switch(Device::PrimaryIn, false));
        if !commands.is_empty() {
            self.state.lock.arm(self.settings.locking_time);
        }
        commands
    }

    fn adjust(&mut self, requested: Watts, is_channel_connected: bool) -> Vec<Command> {
        let allocation =
            Allocator { settings: &self.settings, state: &self.state, gateway: &self.gateway }
                .plan(requested);
        match allocation {
            Allocation::Unchanged => Vec::new(),
            Allocation::Saturated { primary_share, draw } => {
                info!(?requested, ?primary_share, ?draw, "batteries seem to be full, holding");
                Vec::new()
            }
            Allocation::Planned(plan) => self.apply(plan, is_channel_connected),
        }
    }

    fn apply(&mut self, plan: AllocationPlan, is_channel_connected: bool) -> Vec<Command> {
        if !is_channel_connected {
            warn!(setpoint = ?plan.setpoint, "command channel is disconnected, skipping");
            return Vec::new();
        }
        info!(
            setpoint = ?plan.setpoint,
            primary_share = ?plan.primary_share,
            secondary = ?plan.secondary,
            "adjusting charging power",
        );

        self.state.setpoint = plan.setpoint;
        self.state.primary_share = plan.primary_share;
        self.state.lock.arm(self.settings.locking_time);

        let mut commands = self.charging_power_commands(plan.primary_share);
        if let Some(on) = plan.secondary {
            commands.extend(self.gateway.request_switch(Device::SecondaryIn, on));
        }
        commands
    }

    fn charging_power_commands(&self, power: Watts) -> Vec<Command> {
        self.fleet
            .batteries
            .iter()
            .filter_map(|battery| {
                let Some(encoder) = battery.model.encoder() else {
                    warn!(
                        serial_number = %battery.serial_number,
                        model = %battery.model,
                        "unsupported battery model, skipping",
                    );
                    return None;
                };
                Some(Command::Publish {
                    serial_number: battery.serial_number.clone(),
                    command: encoder.charging_power(power),
                })
            })
            .collect()
    }

    /// Apply the switch outcome and return the notification text.
    pub fn on_switched(&mut self, device: Device, on: bool, result: Result<bool>) -> String {
        let notification = self.gateway.complete_switch(device, on, result);
        if device == Device::PrimaryIn {
            self.state.charging = self.gateway.is_on(Device::PrimaryIn);
        }
        notification
    }

    /// Seed the logical switch state at startup.
    pub fn synchronize(&mut self, device: Device, on: bool) {
        self.gateway.synchronize(device, on);
        if device == Device::PrimaryIn {
            self.state.charging = on;
        }
    }

    pub fn next_poll(&mut self) -> Option<Poll> {
        self.observer.next_poll()
    }

    pub fn on_polled(&mut self, poll: Poll, result: Result<Watts>) {
        self.observer.complete(poll, result, &self.settings, &mut self.gateway, &mut self.signals);
    }

    /// Start a state-of-charge round and return the topics to subscribe to.
    pub fn begin_state_of_charge(&mut self) -> Vec<String> {
        let serial_numbers =
            self.fleet.batteries.iter().map(|battery| battery.serial_number.as_str());
        self.state_of_charge.begin(serial_numbers.clone());
        serial_numbers.map(StateOfChargeCollector::topic).collect()
    }

    /// Accept a property message and tell whether the round is complete.
    pub fn on_property_message(&mut self, topic: &str, payload: &[u8]) -> bool {
        match self.state_of_charge.accept(topic, payload) {
            Ok(Some((serial_number, charge))) => {
                info!(
                    %serial_number,
                    master = ?charge.master,
                    slaves = ?charge.slaves,
                    "state of charge",
                );
                if charge.master.is_full() {
                    info!(%serial_number, "battery is full");
                }
                self.signals.state_of_charge.insert(serial_number, charge);
                self.state_of_charge.is_complete()
            }
            Ok(None) => false,
            Err(error) => {
                warn!("failed to process the property message: {error:#}");
                false
            }
        }
    }

    /// Commands to re-enable the DC output on the batteries which need it.
    pub fn dc_output_commands(&self) -> Vec<Command> {
        self.fleet
            .batteries
            .iter()
            .filter(|battery| battery.keep_dc_output)
            .filter_map(|battery| {
                let command = battery.model.encoder().and_then(|encoder| encoder.dc_output(true));
                if command.is_none() {
                    warn!(
                        serial_number = %battery.serial_number,
                        model = %battery.model,
                        "the model does not support the DC output command",
                    );
                }
                Some(Command::Publish {
                    serial_number: battery.serial_number.clone(),
                    command: command?,
                })
            })
            .collect()
    }
}
