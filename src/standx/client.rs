//! StandX perps REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::grid::{
    AssetPrecision, Balance, GridError, GridExchange, GridResult, OrderRequest, OrderSnapshot,
    OrderType, Position, Ticker, VenueStatus,
};

use super::auth::{signing_payload, Authenticator, RequestSigner};
use super::responses::{
    ApiMessage, CancelOrder, CrossBalance, NewOrder, OpenOrders, OrderDetail, PositionEntry,
    SymbolPrice,
};

pub const DEFAULT_API_BASE_URL: &str = "https://perps.standx.com";

const SIGN_VERSION: &str = "v1";

/// Input configuration for creating a StandxGateway
#[derive(Debug, Clone)]
pub struct StandxGatewayInput {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Price and size formatting for order bodies
    pub precision: AssetPrecision,
}

impl Default for StandxGatewayInput {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            precision: AssetPrecision::default(),
        }
    }
}

/// `GridExchange` over the StandX REST API
///
/// Private endpoints need a prior [`StandxGateway::login`]. A 401 triggers
/// one re-login and one retry of the same call.
pub struct StandxGateway {
    http: Client,
    base_url: String,
    precision: AssetPrecision,
    authenticator: Arc<dyn Authenticator>,
    signer: Option<Arc<dyn RequestSigner>>,
    token: RwLock<Option<String>>,
}

impl StandxGateway {
    pub fn new(
        input: StandxGatewayInput,
        authenticator: Arc<dyn Authenticator>,
        signer: Option<Arc<dyn RequestSigner>>,
    ) -> GridResult<Self> {
        let http = Client::builder().timeout(input.request_timeout).build()?;
        Ok(Self::with_client(http, input, authenticator, signer))
    }

    pub fn with_client(
        http: Client,
        input: StandxGatewayInput,
        authenticator: Arc<dyn Authenticator>,
        signer: Option<Arc<dyn RequestSigner>>,
    ) -> Self {
        Self {
            http,
            base_url: input.base_url.trim_end_matches('/').to_string(),
            precision: input.precision,
            authenticator,
            signer,
            token: RwLock::new(None),
        }
    }

    /// Fetch a fresh access token and keep it for later calls
    pub async fn login(&self) -> GridResult<String> {
        let token = self.authenticator.login().await?;
        *self.token.write().await = Some(token.clone());
        info!("Logged in to StandX at {}", self.base_url);
        Ok(token)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    async fn current_token(&self) -> GridResult<String> {
        self.token.read().await.clone().ok_or(GridError::NotAuthenticated)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str) -> GridResult<T> {
        let response = self.http.get(self.url(path)).send().await?;
        let text = read_body(response).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_private<T: DeserializeOwned>(&self, path: &str) -> GridResult<T> {
        let url = self.url(path);
        let text = self
            .send_authorized(|token| Ok(self.http.get(&url).bearer_auth(token)))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Signed POST; every attempt gets its own request id and timestamp
    async fn post_signed(&self, path: &str, body: String) -> GridResult<String> {
        let url = self.url(path);
        self.send_authorized(|token| {
            let request = self
                .http
                .post(&url)
                .bearer_auth(token)
                .header("Content-Type", "application/json");
            let request = self.sign_headers(request, &body)?;
            Ok(request.body(body.clone()))
        })
        .await
    }

    fn sign_headers(&self, request: RequestBuilder, body: &str) -> GridResult<RequestBuilder> {
        let Some(signer) = &self.signer else {
            return Ok(request);
        };
        let request_id = Uuid::new_v4().to_string();
        let timestamp = Utc::now().timestamp_millis();
        let signature = signer.sign(&signing_payload(SIGN_VERSION, &request_id, timestamp, body))?;
        Ok(request
            .header("x-request-sign-version", SIGN_VERSION)
            .header("x-request-id", request_id)
            .header("x-request-timestamp", timestamp.to_string())
            .header("x-request-signature", signature))
    }

    async fn send_authorized<F>(&self, build: F) -> GridResult<String>
    where
        F: Fn(&str) -> GridResult<RequestBuilder> + Send + Sync,
    {
        let token = self.current_token().await?;
        let response = build(&token)?.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_body(response).await;
        }

        warn!("StandX rejected the access token, logging in again");
        let token = self
            .login()
            .await
            .map_err(|e| GridError::Auth(format!("re-login failed: {}", e)))?;
        let response = build(&token)?.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(GridError::Auth("access token rejected after re-login".into()));
        }
        read_body(response).await
    }

    fn new_order_body<'a>(&self, symbol: &'a str, order: &OrderRequest) -> GridResult<NewOrder<'a>> {
        let (time_in_force, price) = match order.order_type {
            OrderType::Market => ("ioc", None),
            OrderType::Limit => {
                let price = order
                    .price
                    .ok_or_else(|| GridError::Rejected("limit order without price".into()))?;
                ("alo", Some(self.precision.format_price(price)))
            }
        };
        Ok(NewOrder {
            symbol,
            side: order.side.as_str(),
            order_type: order.order_type.as_str(),
            qty: self.precision.format_size(order.size),
            reduce_only: order.reduce_only,
            time_in_force,
            price,
        })
    }
}

async fn read_body(response: Response) -> GridResult<String> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(GridError::Transport(format!("HTTP {}: {}", status, text)));
    }
    Ok(text)
}

#[async_trait]
impl GridExchange for StandxGateway {
    async fn get_price(&self, symbol: &str) -> GridResult<Ticker> {
        let price: SymbolPrice = self
            .get_public(&format!("/api/query_symbol_price?symbol={}", symbol))
            .await?;
        Ok(Ticker {
            contract: symbol.to_string(),
            last: price.last_price,
        })
    }

    async fn get_positions(&self, symbol: &str) -> GridResult<Vec<Position>> {
        let entries: Vec<PositionEntry> = self
            .get_private(&format!("/api/query_positions?symbol={}", symbol))
            .await?;
        Ok(entries.into_iter().map(Position::from).collect())
    }

    async fn get_open_orders(&self, symbol: &str) -> GridResult<Vec<OrderSnapshot>> {
        let orders: OpenOrders = self
            .get_private(&format!("/api/query_open_orders?symbol={}", symbol))
            .await?;
        Ok(orders.result.into_iter().map(OrderSnapshot::from).collect())
    }

    async fn get_order_status(&self, _symbol: &str, order_id: &str) -> GridResult<VenueStatus> {
        let detail: OrderDetail = self
            .get_private(&format!("/api/query_order?order_id={}", order_id))
            .await?;
        Ok(VenueStatus::parse(&detail.status))
    }

    async fn place_order(&self, symbol: &str, order: &OrderRequest) -> GridResult<()> {
        let body = serde_json::to_string(&self.new_order_body(symbol, order)?)?;
        debug!("[{}] new_order {}", symbol, body);

        let text = self.post_signed("/api/new_order", body).await.map_err(|e| {
            error!("[{}] Failed to place order: {}", symbol, e);
            e
        })?;
        let reply: ApiMessage = serde_json::from_str(&text)?;
        if !reply.is_success() {
            return Err(GridError::Rejected(reply.message.unwrap_or(text)));
        }
        Ok(())
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GridResult<()> {
        let order_id: i64 = order_id
            .parse()
            .map_err(|_| GridError::Rejected(format!("invalid order id {}", order_id)))?;
        let body = serde_json::to_string(&CancelOrder { order_id })?;
        debug!("[{}] cancel_order {}", symbol, body);
        self.post_signed("/api/cancel_order", body).await?;
        Ok(())
    }

    async fn get_balance(&self) -> GridResult<Balance> {
        let balance: CrossBalance = self.get_private("/api/query_balance").await?;
        Ok(Balance {
            available: balance.cross_available,
            total: balance.cross_balance,
        })
    }
}
