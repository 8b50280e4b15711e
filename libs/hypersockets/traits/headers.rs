use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers to send with the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Trait for providing handshake headers dynamically
///
/// Called on every connection attempt, including every reconnection, so
/// signed material (timestamps, session ids, signatures) is always fresh.
///
/// # Example
/// ```ignore
/// struct ApiKeyHeaders {
///     api_key: String,
/// }
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for ApiKeyHeaders {
///     async fn get_headers(&self) -> Result<Headers> {
///         let mut headers = Headers::new();
///         headers.insert("X-API-Key".to_string(), self.api_key.clone());
///         Ok(headers)
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next connection attempt
    ///
    /// An error aborts the attempt before any network I/O happens.
    async fn get_headers(&self) -> Result<Headers>;
}

/// A header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Result<Headers> {
        Ok(HashMap::new())
    }
}
