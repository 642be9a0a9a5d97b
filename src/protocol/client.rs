//! Client trait for the cache's text protocol.
//!
//! [`Connection`](crate::Connection) is the production implementation. The
//! verifier only talks to nodes through this trait, so scenario logic can be
//! exercised against mocks without a socket.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::AssertionFailure;
use crate::DeleteOutcome;
use crate::Hit;
use crate::Op;
use crate::Record;
use crate::Result;
use crate::StoreOutcome;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheClient: Send {
    /// Stores `record` and waits for the `STORED` confirmation.
    ///
    /// # Errors
    ///
    /// - [`crate::ProtocolError::UnexpectedTerminal`] for any other reply line
    /// - [`crate::TimeoutError`] if no reply arrives in time
    async fn set(
        &mut self,
        record: &Record,
    ) -> Result<StoreOutcome>;

    /// Retrieves `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` if the server answered with the end marker alone
    /// * `Ok(Some(hit))` for a single metadata line, value and end marker
    /// * `Err(_)` for any other reply shape
    async fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<Hit>>;

    /// Deletes `key`; `DELETED` and `NOT_FOUND` are the only accepted replies.
    async fn delete(
        &mut self,
        key: &str,
    ) -> Result<DeleteOutcome>;
}

/// Fails unless `get` reports `key` as absent.
pub async fn assert_absent<C>(
    client: &mut C,
    node: &str,
    key: &str,
) -> Result<()>
where
    C: CacheClient + ?Sized,
{
    match client.get(key).await? {
        None => Ok(()),
        Some(hit) => Err(AssertionFailure {
            node: node.to_string(),
            op: Op::Get,
            key: key.to_string(),
            expected: "END".to_string(),
            actual: hit.describe(),
        }
        .into()),
    }
}
