pub mod openai;
pub mod types;

use anyhow::Result;

pub use types::ModelRequest;

/// A blocking chat-completion backend.
pub trait ModelClient {
    /// The raw text of the first completion choice.
    fn complete(&self, req: &ModelRequest<'_>) -> Result<String>;
}
