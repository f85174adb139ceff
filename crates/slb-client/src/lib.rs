//! SLB REST API Client
//!
//! A Rust client library for the Server Load Balancer (SLB) control plane.
//! Provides typed models and methods for reading a load balancer and managing
//! its listeners and backend members.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use slb_client::{SlbClient, StaticToken, DEFAULT_REQUEST_TIMEOUT};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client
//! let client = SlbClient::new(
//!     "https://slb.example.com/api/v1".to_string(),
//!     Arc::new(StaticToken::new("your-api-token")),
//!     DEFAULT_REQUEST_TIMEOUT,
//! )?;
//!
//! // Read the load balancer and its listeners
//! let lb = client.get_load_balancer("slb-123").await?;
//! let listeners = client.list_listeners(&lb.slb_id).await?;
//!
//! // Inspect the members behind the first listener
//! if let Some(listener) = listeners.first() {
//!     let members = client.list_backends(&lb.slb_id, &listener.listener_id).await?;
//!     println!("{} has {} members", listener.listener_name, members.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Listeners**: List, create, update and delete listeners
//! - **Backends**: List, add and remove backend members
//! - **Authentication**: Static bearer tokens or a cached token exchange
//! - **Mocking**: `test-util` feature provides an in-memory client

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod slb_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth::{KeycloakTokenSource, StaticToken, TokenCache, TokenSource};
pub use client::{DEFAULT_REQUEST_TIMEOUT, SlbClient};
pub use common::HttpClient;
pub use error::SlbError;
pub use models::*;
pub use slb_trait::SlbClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockOperation, MockSlbClient};
