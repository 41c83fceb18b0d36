pub mod callmebot;
pub mod ecoflow;
pub mod heartbeat;
pub mod shelly;

use async_trait::async_trait;
use sunsink_quantities::Watts;

use crate::{core::battery::SetCommand, prelude::*};

/// Grid power meter.
#[async_trait]
pub trait Meter: Send + Sync {
    /// Active power: positive when importing, negative when exporting.
    async fn read_power(&self) -> Result<Watts>;
}

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct SwitchStatus {
    pub output: bool,

    /// Real power flowing through the switch.
    pub power: Watts,
}

/// Remote on-off switch with a power meter.
#[async_trait]
pub trait Switch: Send + Sync {
    /// Switch and return the previous state.
    async fn set(&self, on: bool) -> Result<bool>;

    async fn status(&self) -> Result<SwitchStatus>;
}

/// Fire-and-forget battery command channel.
pub trait CommandChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    fn publish(&self, serial_number: &str, command: &SetCommand) -> Result;

    fn subscribe(&self, topic: &str) -> Result;

    fn unsubscribe(&self, topic: &str) -> Result;
}

/// Best-effort human notification.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, text: &str);
}
