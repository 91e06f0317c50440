//! Operator notifications
//!
//! Delivery is fire-and-forget: failures are logged and never reach the
//! grid engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Timelike};
use log::{error, info, warn};
use reqwest::{Client, Url};

use crate::grid::{GridError, GridResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!("[notify] {}", message);
    }
}

/// Push notifications through a Bark server (`{bark_url}/{message}`)
#[derive(Debug, Clone)]
pub struct BarkNotifier {
    client: Client,
    base_url: Url,
}

impl BarkNotifier {
    pub fn new(bark_url: &str, timeout: Duration) -> GridResult<Self> {
        let base_url = Url::parse(bark_url)
            .map_err(|e| GridError::InvalidConfig(format!("bark_url {}: {}", bark_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GridError::InvalidConfig(format!(
                "bark_url {} cannot take a path",
                bark_url
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Message URL; daytime pushes are marked critical so they ring through
    pub fn message_url(&self, message: &str, hour: u32) -> GridResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GridError::InvalidConfig("bark_url cannot take a path".into()))?
            .pop_if_empty()
            .push(message);
        if is_waking_hour(hour) {
            url.query_pairs_mut()
                .append_pair("level", "critical")
                .append_pair("volume", "1");
        }
        Ok(url)
    }

    async fn send(&self, message: &str) -> GridResult<()> {
        let url = self.message_url(message, Local::now().hour())?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GridError::Transport(format!(
                "bark responded {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn is_waking_hour(hour: u32) -> bool {
    (8..24).contains(&hour)
}

#[async_trait]
impl Notifier for BarkNotifier {
    async fn notify(&self, message: &str) {
        info!("[notify] {}", message);
        match self.send(message).await {
            Ok(()) => {}
            Err(GridError::InvalidConfig(e)) => error!("Bark notification not sent: {}", e),
            Err(e) => warn!("Bark notification failed: {}", e),
        }
    }
}
