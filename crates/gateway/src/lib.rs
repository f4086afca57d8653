//! Client for the local language-model server.
//!
//! Speaks the Ollama HTTP API: `GET /api/tags` to list models and
//! `POST /api/generate` for non-streaming completions.
//!
//! ```no_run
//! use gateway::{GatewayConfig, OllamaClient};
//!
//! # async fn example() -> gateway::Result<()> {
//! let client = OllamaClient::new(GatewayConfig::default())?;
//! let models = client.list_models().await?;
//! if let Some(first) = models.first() {
//!     client.select_model(first.clone());
//! }
//! let answer = client.generate("Why is the sky blue?", None).await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{GatewayConfig, OllamaClient};
pub use error::{GatewayError, Result};
