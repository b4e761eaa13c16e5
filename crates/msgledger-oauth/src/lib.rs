//! # msgledger-oauth
//!
//! `OAuth2` client-credentials authentication for API clients.
//!
//! ## Features
//!
//! - **Client-credentials grant**: form-encoded exchange with retry on transient failures
//! - **Token management**: expiry tracking with a configurable safety margin
//! - **Single-flight refresh**: concurrent callers share one in-flight exchange
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use msgledger_oauth::{OAuthClient, TokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let url = "https://api.hostaway.com/v1/accessTokens".parse()?;
//!     let client = OAuthClient::new("your_client_id", "your_secret", url);
//!     let tokens = Arc::new(TokenProvider::new(client));
//!
//!     let token = tokens.get_token().await?;
//!     println!("Authorization: {}", token.authorization_header());
//!
//!     // After a 401 from the API:
//!     tokens.invalidate(&token).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::OAuthClient;
pub use provider::TokenProvider;
pub use token::Token;
