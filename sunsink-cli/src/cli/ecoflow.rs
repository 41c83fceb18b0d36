use std::time::Duration;

use clap::Parser;
use rumqttc::{MqttOptions, Transport};
use tokio::sync::mpsc;

use crate::{api::ecoflow, core::battery::Fleet};

#[derive(Parser)]
pub struct EcoFlowArgs {
    /// Battery fleet JSON: `{"cid": "…", "batteries": [{"sn": "…", "type": "DELTA Max"}]}`.
    #[clap(long = "fleet", env = "ECOFLOW_FLEET")]
    pub fleet: Fleet,

    #[clap(long = "mqtt-host", env = "ECOFLOW_MQTT_HOST", default_value = "mqtt.ecoflow.com")]
    pub mqtt_host: String,

    #[clap(long = "mqtt-port", env = "ECOFLOW_MQTT_PORT", default_value = "8883")]
    pub mqtt_port: u16,

    #[clap(long = "mqtt-username", env = "ECOFLOW_MQTT_USERNAME")]
    pub mqtt_username: String,

    #[clap(long = "mqtt-password", env = "ECOFLOW_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: String,
}

impl EcoFlowArgs {
    pub fn connect(&self) -> (ecoflow::Channel, mpsc::UnboundedReceiver<ecoflow::Message>) {
        let mut options = MqttOptions::new(&self.fleet.client_id, &self.mqtt_host, self.mqtt_port);
        options
            .set_credentials(&self.mqtt_username, &self.mqtt_password)
            .set_keep_alive(Duration::from_secs(30))
            .set_transport(Transport::tls_with_default_config());
        ecoflow::Channel::connect(options, self.fleet.client_id.clone())
    }
}
