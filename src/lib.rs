//! Async client for the SambaNova Cloud chat-completions API.
//!
//! ```no_run
//! use sambanova::{ChatMessage, ChatOptions, ClientConfig, SambanovaClient};
//!
//! # async fn run() -> Result<(), sambanova::ClientError> {
//! let client = SambanovaClient::new(ClientConfig::new("sk-..."))?;
//! let reply = client
//!     .chat(vec![ChatMessage::user("Hi!")], ChatOptions::default())
//!     .await?;
//! println!("{}", reply.content().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod inference;

pub use inference::{
    load_client_config, models, ChatCompletion, ChatCompletionChunk, ChatMessage, ChatOptions,
    ClientConfig, ClientError, ContentPart, MessageContent, Role, SambanovaClient,
};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "sambanova=info,warn";

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Install a global `tracing` subscriber writing to stderr.
///
/// The library itself never installs one; this is a convenience for
/// binaries and tests. Filter comes from `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_FILTER`]. Returns `false` if a global subscriber was
/// already set, in which case nothing changes.
pub fn init_tracing(format: LogFormat) -> bool {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };

    if installed {
        tracing::debug!(version = env!("CARGO_PKG_VERSION"), ?format, "tracing initialized");
    }
    installed
}
