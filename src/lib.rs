// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod decoder;
pub mod error;
pub mod markdown;
pub mod observability;
pub mod render;
pub mod transport;
pub mod types;
pub mod utils;

// Re-exports
pub use client::ChatClient;
pub use client_logger::{JsonLinesLogger, SessionLogger};
pub use decoder::{MalformedTail, StreamDecoder};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{HtmlRenderer, PlainTextRenderer, Renderer};
pub use transport::{ByteStream, Transport, cancellable};
pub use types::*;
