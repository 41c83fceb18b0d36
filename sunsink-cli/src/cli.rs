mod control;
mod devices;
mod ecoflow;
mod notifications;

use std::sync::Arc;

use clap::Parser;

use crate::{
    cli::{
        control::ControlArgs,
        devices::DeviceArgs,
        ecoflow::EcoFlowArgs,
        notifications::NotificationArgs,
    },
    core::controller::Controller,
    prelude::*,
    runner::Runner,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub control: ControlArgs,

    #[clap(flatten)]
    pub devices: DeviceArgs,

    #[clap(flatten)]
    pub ecoflow: EcoFlowArgs,

    #[clap(flatten)]
    pub notifications: NotificationArgs,
}

impl Args {
    pub async fn run(self) -> Result {
        let settings = self.control.settings();
        info!(?settings, n_batteries = self.ecoflow.fleet.batteries.len(), "configured");
        for battery in &self.ecoflow.fleet.batteries {
            if battery.model.encoder().is_none() {
                warn!(
                    serial_number = %battery.serial_number,
                    model = %battery.model,
                    "unsupported model, the battery will not be controlled",
                );
            }
        }

        let controller = Controller::builder()
            .settings(settings)
            .fleet(self.ecoflow.fleet.clone())
            .has_secondary(self.devices.secondary_switch_url.is_some())
            .has_discharge_output(self.devices.discharge_switch_url.is_some())
            .build()?;
        let (channel, messages) = self.ecoflow.connect();

        Runner::builder()
            .controller(controller)
            .meter(Arc::new(self.devices.meter()?))
            .switches(self.devices.switches()?)
            .channel(Box::new(channel))
            .messages(messages)
            .notifier(Arc::new(self.notifications.notifier()?))
            .heartbeat(self.notifications.heartbeat()?)
            .interval(self.control.interval)
            .state_of_charge_interval(self.control.state_of_charge_interval)
            .maybe_dc_output_interval(self.control.dc_output_interval.map(Into::into))
            .build()
            .run()
            .await
    }
}
