use async_trait::async_trait;
use shared::items::OrderedItem;

use crate::error::PersistError;

/// What the server stored after a successful replace.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledged<T> {
    pub items: Vec<T>,
    /// `None` when the server did not report a revision.
    pub revision: Option<i64>,
}

/// Stores a whole collection at once. Either every item is stored in the
/// given order or nothing changes. Implementations do not retry.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn replace_all<T: OrderedItem>(
        &self,
        items: Vec<T>,
        expected_revision: Option<i64>,
    ) -> Result<Acknowledged<T>, PersistError>;
}
