//! Single-task run loop: owns the controller and feeds it with the I/O completions.

use std::{
    future::pending,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use bon::Builder;
use sunsink_quantities::Watts;
use tokio::{
    select,
    sync::mpsc,
    time::{Interval, MissedTickBehavior, interval},
};

use crate::{
    api::{CommandChannel, Meter, Notify, Switch, ecoflow::Message, heartbeat},
    core::{
        controller::Controller,
        gateway::{Command, Device},
        observer::Poll,
    },
    prelude::*,
};

/// Completion of an outbound call.
pub enum Event {
    Sampled(Result<Watts>),
    Switched { device: Device, on: bool, result: Result<bool> },
    Polled { poll: Poll, result: Result<Watts> },
}

#[derive(Clone)]
pub struct Switches {
    pub primary: Arc<dyn Switch>,
    pub secondary: Option<Arc<dyn Switch>>,
    pub discharge: Option<Arc<dyn Switch>>,
}

impl Switches {
    #[must_use]
    pub const fn get(&self, device: Device) -> Option<&Arc<dyn Switch>> {
        match device {
            Device::PrimaryIn => Some(&self.primary),
            Device::SecondaryIn => self.secondary.as_ref(),
            Device::DischargeOut => self.discharge.as_ref(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (Device, &Arc<dyn Switch>)> {
        [Device::PrimaryIn, Device::SecondaryIn, Device::DischargeOut]
            .into_iter()
            .filter_map(|device| Some((device, self.get(device)?)))
    }
}

#[derive(Builder)]
pub struct Runner {
    controller: Controller,
    meter: Arc<dyn Meter>,
    switches: Switches,
    channel: Box<dyn CommandChannel>,
    messages: mpsc::UnboundedReceiver<Message>,
    notifier: Arc<dyn Notify>,
    heartbeat: heartbeat::Client,

    #[builder(into)]
    interval: Duration,

    #[builder(into)]
    state_of_charge_interval: Duration,

    dc_output_interval: Option<Duration>,

    #[builder(skip)]
    is_meter_in_flight: bool,

    /// Property topics of the ongoing state-of-charge round.
    #[builder(skip)]
    state_of_charge_topics: Vec<String>,
}

impl Runner {
    pub async fn run(mut self) -> Result {
        self.synchronize().await;

        let (events_sender, mut events) = mpsc::unbounded_channel();
        let mut ticks = new_interval(self.interval);
        let mut state_of_charge_ticks = new_interval(self.state_of_charge_interval);
        let mut dc_output_ticks = self.dc_output_interval.map(new_interval);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(interval = ?self.interval, "running…");
        loop {
            select! {
                _ = ticks.tick() => self.on_tick(&events_sender),
                Some(event) = events.recv() => self.on_event(event, &events_sender),
                Some(message) = self.messages.recv() => self.on_message(&message),
                _ = state_of_charge_ticks.tick() => self.begin_state_of_charge(),
                () = tick(dc_output_ticks.as_mut()) => self.keep_dc_output(&events_sender),
                result = &mut shutdown => {
                    result.context("failed to listen for the interrupt signal")?;
                    info!("interrupted, stopping…");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Seed the logical switch states from the actual switch outputs.
    #[instrument(skip_all)]
    async fn synchronize(&mut self) {
        let switches = self.switches.clone();
        for (device, switch) in switches.iter() {
            match switch.status().await {
                Ok(status) => {
                    info!(%device, on = status.output, power = ?status.power, "synchronized");
                    self.controller.synchronize(device, status.output);
                }
                Err(error) => {
                    warn!(%device, "failed to fetch the status, assuming off: {error:#}");
                }
            }
        }
        info!(charging = self.controller.state().charging, "synchronized the switches");
    }

    fn on_tick(&mut self, events: &mpsc::UnboundedSender<Event>) {
        if self.is_meter_in_flight {
            warn!("the previous meter read is still in flight");
        } else {
            self.is_meter_in_flight = true;
            let meter = Arc::clone(&self.meter);
            spawn_call(events, async move { meter.read_power().await }, Event::Sampled);
        }

        if let Some(poll) = self.controller.next_poll() {
            let switch = self.switches.get(poll.device()).map(Arc::clone);
            let call = async move {
                let switch = switch.context("no switch is configured for the poll")?;
                Ok::<_, Error>(switch.status().await?.power)
            };
            spawn_call(events, call, move |result| Event::Polled { poll, result });
        }
    }

    fn on_event(&mut self, event: Event, events: &mpsc::UnboundedSender<Event>) {
        match event {
            Event::Sampled(result) => {
                self.is_meter_in_flight = false;
                match result {
                    Ok(power) => self.on_sample(power, events),
                    Err(error) => warn!("failed to read the meter: {error:#}"),
                }
            }
            Event::Switched { device, on, result } => {
                let text = self.guarded(|controller| controller.on_switched(device, on, result));
                if let Some(text) = text {
                    let notifier = Arc::clone(&self.notifier);
                    tokio::spawn(async move { notifier.notify(&text).await });
                }
            }
            Event::Polled { poll, result } => {
                self.guarded(|controller| controller.on_polled(poll, result));
            }
        }
    }

    fn on_sample(&mut self, power: Watts, events: &mpsc::UnboundedSender<Event>) {
        let is_channel_connected = self.channel.is_connected();
        if let Some(commands) =
            self.guarded(|controller| controller.on_sample(power, is_channel_connected))
        {
            self.execute(commands, events);
        }
        let heartbeat = self.heartbeat.clone();
        tokio::spawn(async move { heartbeat.send().await });
    }

    /// Run the controller, surviving its panics so that the next tick starts afresh.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Controller) -> T) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(|| f(&mut self.controller))) {
            Ok(output) => Some(output),
            Err(_) => {
                error!("the controller panicked, skipping");
                None
            }
        }
    }

    fn execute(&self, commands: Vec<Command>, events: &mpsc::UnboundedSender<Event>) {
        for command in commands {
            match command {
                Command::Switch { device, on } => {
                    let switch = self.switches.get(device).map(Arc::clone);
                    let call = async move {
                        switch.context("the switch is not configured")?.set(on).await
                    };
                    spawn_call(events, call, move |result| Event::Switched { device, on, result });
                }
                Command::Publish { serial_number, command } => {
                    if let Err(error) = self.channel.publish(&serial_number, &command) {
                        warn!(%serial_number, "failed to publish the command: {error:#}");
                    }
                }
            }
        }
    }

    fn begin_state_of_charge(&mut self) {
        if !self.channel.is_connected() {
            warn!("command channel is disconnected, skipping the state of charge");
            return;
        }
        self.state_of_charge_topics = self.controller.begin_state_of_charge();
        for topic in &self.state_of_charge_topics {
            if let Err(error) = self.channel.subscribe(topic) {
                warn!("{error:#}");
            }
        }
    }

    fn on_message(&mut self, message: &Message) {
        let is_complete = self
            .guarded(|controller| controller.on_property_message(&message.topic, &message.payload))
            .unwrap_or_default();
        if is_complete {
            info!(state_of_charge = ?self.controller.signals().state_of_charge, "collected");
            for topic in self.state_of_charge_topics.drain(..) {
                if let Err(error) = self.channel.unsubscribe(&topic) {
                    warn!("{error:#}");
                }
            }
        }
    }

    fn keep_dc_output(&self, events: &mpsc::UnboundedSender<Event>) {
        if !self.channel.is_connected() {
            warn!("command channel is disconnected, skipping the DC output");
            return;
        }
        info!("enabling the DC output…");
        self.execute(self.controller.dc_output_commands(), events);
    }
}

/// Run the call in its own task and report the completion, even when the call panics.
fn spawn_call<T: Send + 'static>(
    events: &mpsc::UnboundedSender<Event>,
    call: impl Future<Output = Result<T>> + Send + 'static,
    into_event: impl FnOnce(Result<T>) -> Event + Send + 'static,
) {
    let events = events.clone();
    tokio::spawn(async move {
        let result = tokio::spawn(call)
            .await
            .context("the call panicked")
            .and_then(|result| result);
        let _ = events.send(into_event(result));
    });
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = interval(period);
    interval.reset_after(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Tick the interval, if any.
async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
