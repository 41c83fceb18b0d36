//! EcoFlow cloud MQTT: battery commands and property messages.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::{sync::mpsc, time::sleep};

use crate::{api::CommandChannel, core::battery::SetCommand, prelude::*};

/// Incoming message on a subscribed topic.
#[derive(Debug)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub struct Channel {
    client: AsyncClient,

    /// EcoFlow client ID used in the command topics.
    client_id: String,

    is_connected: Arc<AtomicBool>,
    message_id: AtomicU64,
}

impl Channel {
    const RECONNECT_DELAY: Duration = Duration::from_secs(5);

    /// Spawn the connection event loop and return the channel along with the incoming messages.
    #[instrument(skip_all, fields(client_id = %client_id))]
    pub fn connect(
        options: MqttOptions,
        client_id: String,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (client, event_loop) = AsyncClient::new(options, 16);
        let is_connected = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_event_loop(event_loop, Arc::clone(&is_connected), sender));
        let message_id = AtomicU64::new(initial_message_id());
        (Self { client, client_id, is_connected, message_id }, receiver)
    }
}

impl CommandChannel for Channel {
    fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    #[instrument(skip_all, fields(serial_number = %serial_number))]
    fn publish(&self, serial_number: &str, command: &SetCommand) -> Result {
        let topic = command_topic(&self.client_id, serial_number);
        let id = self.message_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&Envelope::new(id, command))?;
        debug!(%topic, payload = %String::from_utf8_lossy(&payload), "publishing…");
        self.client
            .try_publish(&topic, QoS::AtMostOnce, false, payload)
            .with_context(|| format!("failed to publish to `{topic}`"))
    }

    fn subscribe(&self, topic: &str) -> Result {
        debug!(topic, "subscribing…");
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .with_context(|| format!("failed to subscribe to `{topic}`"))
    }

    fn unsubscribe(&self, topic: &str) -> Result {
        debug!(topic, "unsubscribing…");
        self.client
            .try_unsubscribe(topic)
            .with_context(|| format!("failed to unsubscribe from `{topic}`"))
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    is_connected: Arc<AtomicBool>,
    messages: mpsc::UnboundedSender<Message>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to the broker");
                is_connected.store(true, Ordering::Relaxed);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("disconnected by the broker");
                is_connected.store(false, Ordering::Relaxed);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = Message { topic: publish.topic, payload: publish.payload.to_vec() };
                if messages.send(message).is_err() {
                    debug!("the receiver is gone, stopping the event loop");
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => {
                if is_connected.swap(false, Ordering::Relaxed) {
                    warn!("connection lost: {error:#}");
                } else {
                    debug!("failed to connect: {error:#}");
                }
                sleep(Channel::RECONNECT_DELAY).await;
            }
        }
    }
}

#[must_use]
fn command_topic(client_id: &str, serial_number: &str) -> String {
    format!("/app/{client_id}/{serial_number}/thing/property/set")
}

/// Seed the message IDs from the clock, so that they do not repeat across restarts.
fn initial_message_id() -> u64 {
    chrono::Utc::now().timestamp_millis().unsigned_abs() % 1_000_000_000
}

#[derive(Serialize)]
struct Envelope<'a> {
    from: &'static str,
    id: String,
    lang: &'static str,
    version: &'static str,

    #[serde(flatten)]
    command: &'a SetCommand,
}

impl<'a> Envelope<'a> {
    fn new(id: u64, command: &'a SetCommand) -> Self {
        Self { from: "iOS", id: id.to_string(), lang: "en-us", version: "1.0", command }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sunsink_quantities::Watts;

    use super::*;
    use crate::core::battery::{ChargeCommandEncoder, Delta2Encoder, DeltaMaxEncoder};

    #[test]
    fn command_topic_ok() {
        assert_eq!(
            command_topic("ANDROID_1_1234", "R331ZEB4ZE000001"),
            "/app/ANDROID_1_1234/R331ZEB4ZE000001/thing/property/set",
        );
    }

    #[test]
    fn delta_max_envelope_ok() -> Result {
        let command = DeltaMaxEncoder.charging_power(Watts::from(400));
        let envelope = serde_json::to_value(Envelope::new(694_572_336, &command))?;
        assert_eq!(
            envelope,
            json!({
                "from": "iOS",
                "operateType": "TCP",
                "id": "694572336",
                "lang": "en-us",
                "params": {"id": 69, "slowChgPower": 400},
                "version": "1.0",
            }),
        );
        Ok(())
    }

    #[test]
    fn delta_2_envelope_ok() -> Result {
        let command = Delta2Encoder.charging_power(Watts::ZERO);
        let envelope = serde_json::to_value(Envelope::new(1, &command))?;
        assert_eq!(envelope["moduleType"], json!(5));
        assert_eq!(envelope["operateType"], json!("acChgCfg"));
        assert_eq!(envelope["params"]["chgPauseFlag"], json!(1));
        assert_eq!(envelope["id"], json!("1"));
        Ok(())
    }

    #[test]
    fn initial_message_id_is_bounded() {
        assert!(initial_message_id() < 1_000_000_000);
    }
}
