use crate::error::{AugmentError, ExtractError};
use async_trait::async_trait;

/// Turns raw uploaded bytes of one or more media types into plain text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    fn supported_types(&self) -> &[&'static str];

    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Produces a natural-language answer for a query from ranked context.
#[async_trait]
pub trait AnswerAugmenter: Send + Sync {
    async fn answer(&self, query: &str, context: &str) -> Result<String, AugmentError>;
}
