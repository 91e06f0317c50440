use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use reqwest::Client;
use tokio::time::interval;

use crate::config::{ConfigError, Settings, TradingMode};
use crate::grid::{
    GridConfig, GridError, GridExchange, GridResult, GridRunner, GridWorker, PaperExchange,
    SimExchange, SimExchangeInput,
};
use crate::notify::{BarkNotifier, LogNotifier, Notifier};
use crate::standx::{RequestSigner, StandxGateway, StandxGatewayInput, StaticToken};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Runner for the grid bot: one worker per configured instrument
pub struct BotRunner {
    settings: Settings,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl BotRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = config_path.as_ref().to_string_lossy();
        Ok(Self::from_settings(Settings::new(&path)?))
    }

    pub fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            signer: None,
        }
    }

    /// Sign live order and cancel requests with `signer`
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        let Some(bark_url) = &self.settings.notify.bark_url else {
            return Arc::new(LogNotifier);
        };
        match BarkNotifier::new(bark_url, self.settings.network.request_timeout()) {
            Ok(bark) => Arc::new(bark),
            Err(e) => {
                warn!("Bark notifications disabled: {}", e);
                Arc::new(LogNotifier)
            }
        }
    }

    /// Logged-in gateway for live trading, signed when a signer was given
    async fn live_gateway(
        &self,
        config: &GridConfig,
        http: Client,
        input: StandxGatewayInput,
    ) -> GridResult<StandxGateway> {
        let token = self.settings.network.access_token.clone().ok_or_else(|| {
            GridError::InvalidConfig("live mode needs network.access_token".into())
        })?;
        if self.signer.is_none() {
            warn!("[{}] No request signer configured, order requests are sent unsigned", config.symbol);
        }
        let gateway =
            StandxGateway::with_client(http, input, Arc::new(StaticToken::new(token)), self.signer.clone());
        gateway.login().await?;
        Ok(gateway)
    }

    async fn exchange_for(&self, config: &GridConfig) -> GridResult<Arc<dyn GridExchange>> {
        let network = &self.settings.network;
        let input = StandxGatewayInput {
            base_url: network.api_base_url.clone(),
            request_timeout: network.request_timeout(),
            precision: config.precision,
        };

        match network.mode {
            TradingMode::Live => {
                let http = Client::builder().timeout(input.request_timeout).build()?;
                Ok(Arc::new(self.live_gateway(config, http, input).await?))
            }
            TradingMode::Paper => {
                // public prices only, no login
                let feed = StandxGateway::new(input, Arc::new(StaticToken::new("")), None)?;
                let start = match feed.get_price(&config.symbol).await {
                    Ok(ticker) => ticker.last,
                    Err(e) => {
                        warn!("[{}] No starting price from feed: {}", config.symbol, e);
                        config.base_price.unwrap_or_default()
                    }
                };

                let paper = &self.settings.paper;
                let sim = SimExchange::with_input(
                    config.symbol.clone(),
                    start,
                    SimExchangeInput {
                        initial_balance: paper.initial_balance,
                        initial_long: paper.initial_long,
                        initial_short: paper.initial_short,
                        publish_delay: paper.publish_delay,
                    },
                );
                Ok(Arc::new(PaperExchange::new(Arc::new(feed), sim)))
            }
        }
    }

    /// Build one runner per configured instrument
    pub async fn build_runners(&self) -> GridResult<Vec<GridRunner>> {
        let configs = self.settings.grid_configs()?;
        let notifier = self.notifier();

        let mut runners = Vec::with_capacity(configs.len());
        for config in configs {
            let exchange = self.exchange_for(&config).await?;
            runners.push(GridRunner::new(
                config,
                exchange,
                notifier.clone(),
                self.settings.notify.uid.clone(),
            )?);
        }
        Ok(runners)
    }

    /// Run every grid until Ctrl-C, then stop and join the workers
    ///
    /// Resting orders are left on the venue.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Starting grid bot in {:?} mode against {}",
            self.settings.network.mode, self.settings.network.api_base_url
        );

        let workers: Vec<GridWorker> = self
            .build_runners()
            .await?
            .into_iter()
            .map(GridWorker::spawn)
            .collect();
        info!("{} grid workers started", workers.len());

        let mut summary_timer = interval(SUMMARY_INTERVAL);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
                _ = summary_timer.tick() => {
                    for worker in &workers {
                        info!("{}", worker.summary());
                    }
                }
            }
        }

        info!("Shutting down, stopping {} workers", workers.len());
        for worker in workers {
            let symbol = worker.symbol().to_string();
            match worker.stop().await {
                Ok(runner) => info!("[{}] Final state: {}", symbol, runner.summary()),
                Err(e) => error!("[{}] {}", symbol, e),
            }
        }
        Ok(())
    }
}
