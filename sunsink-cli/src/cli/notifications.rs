use clap::Parser;
use reqwest::Url;

use crate::{
    api::{callmebot, heartbeat},
    prelude::*,
};

#[derive(Parser)]
pub struct NotificationArgs {
    /// CallMeBot WhatsApp phone number.
    #[clap(long = "callmebot-phone", env = "CALLMEBOT_PHONE")]
    pub phone: Option<String>,

    #[clap(long = "callmebot-api-key", env = "CALLMEBOT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Pinged after each processed meter sample.
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    pub heartbeat_url: Option<Url>,
}

impl NotificationArgs {
    pub fn notifier(&self) -> Result<callmebot::Client> {
        callmebot::Client::new(self.phone.clone(), self.api_key.clone())
    }

    pub fn heartbeat(&self) -> Result<heartbeat::Client> {
        heartbeat::Client::new(self.heartbeat_url.clone())
    }
}
