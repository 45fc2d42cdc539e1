//! Async client for the Genesis chat-completion API.
//!
//! ```no_run
//! use genesis_client::{ChatMessage, ClientConfig, GenesisClient, ModelConfig};
//!
//! # async fn run() -> genesis_client::Result<()> {
//! let client = GenesisClient::new(ClientConfig::new("my-api-key"))?;
//! let completion = client.create_chat_completion(
//!     &[ChatMessage::user("What is 2+2?")],
//!     &ModelConfig::new("genesis-gpt-4"),
//!     None,
//! ).await?;
//! println!("{:?}", completion.content());
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! Layout:
//!
//! ```text
//! src/
//! ├── lib.rs        # Re-exports
//! ├── error.rs      # Error taxonomy
//! ├── config.rs     # Client configuration
//! ├── request.rs    # Wire types
//! ├── validate.rs   # Pre-flight request checks
//! ├── retry.rs      # Backoff between attempts
//! ├── transport.rs  # Transport trait + reqwest implementation
//! ├── stream.rs     # Streamed chunk decoding
//! ├── client.rs     # GenesisClient
//! └── utils.rs      # Token estimates, timestamps
//! ```

pub mod error;
pub mod config;
pub mod request;
pub mod validate;
pub mod retry;
pub mod transport;
pub mod stream;
pub mod client;
pub mod utils;

pub use client::GenesisClient;
pub use config::ClientConfig;
pub use error::{Error, Result, TransportError, ValidationKind};
pub use request::{
  ApiResponse, ChatCompletion, ChatMessage, Choice, Delta, ModelConfig,
  ModelRecord, Role, StreamChoice, StreamChunk, Usage
};
pub use retry::BackoffPolicy;
pub use stream::ChatStream;
pub use transport::{HttpRequest, HttpResponse, Method, Transport};
pub use validate::{validate_messages, validate_model_config, MAX_CONTENT_LENGTH};
