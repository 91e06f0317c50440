//! StandX perpetuals venue
//!
//! [`StandxGateway`] implements the engine's [`GridExchange`](crate::grid::GridExchange)
//! over the StandX REST API. Login and request signing are injected through
//! [`Authenticator`] and [`RequestSigner`].

mod auth;
mod client;
mod responses;

pub use auth::{signing_payload, Authenticator, RequestSigner, StaticToken};
pub use client::{StandxGateway, StandxGatewayInput, DEFAULT_API_BASE_URL};
