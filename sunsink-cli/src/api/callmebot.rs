//! WhatsApp notifications via CallMeBot.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::{api::Notify, prelude::*};

pub struct Client {
    inner: reqwest::Client,
    credentials: Option<Credentials>,
}

struct Credentials {
    phone: String,
    api_key: String,
}

impl Client {
    const URL: &'static str = "https://api.callmebot.com/whatsapp.php";

    /// Notifications are silently disabled unless both the phone and the API key are set.
    pub fn new(phone: Option<String>, api_key: Option<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let credentials = phone.zip(api_key).map(|(phone, api_key)| Credentials { phone, api_key });
        if credentials.is_none() {
            info!("notifications are disabled");
        }
        Ok(Self { inner, credentials })
    }

    fn url(&self, text: &str) -> Result<Option<Url>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };
        let url = Url::parse_with_params(
            Self::URL,
            [
                ("phone", credentials.phone.as_str()),
                ("apikey", credentials.api_key.as_str()),
                ("text", text),
            ],
        )?;
        Ok(Some(url))
    }

    #[instrument(skip_all)]
    async fn send(&self, url: Url) -> Result {
        let body = self
            .inner
            .get(url)
            .send()
            .await
            .context("failed to call CallMeBot")?
            .error_for_status()?
            .text()
            .await?;
        debug!(%body, "sent");
        Ok(())
    }
}

#[async_trait]
impl Notify for Client {
    async fn notify(&self, text: &str) {
        match self.url(text) {
            Ok(Some(url)) => {
                info!(text, "notifying…");
                if let Err(error) = self.send(url).await {
                    warn!("failed to send the notification: {error:#}");
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!("failed to build the notification URL: {error:#}");
            }
        }
    }
}
