//! Pull-based record sequences.
//!
//! [`RecordStream`] is the loader's only input contract: a forward-only
//! sequence of records, advanced one at a time. Advancing may await
//! network I/O and may fail; a failure ends the sequence.

use async_trait::async_trait;

use crate::error::EtlError;
use crate::models::Record;

/// A lazy, finite, forward-only sequence of [`Record`]s.
#[async_trait]
pub trait RecordStream: Send {
    /// Advance by one record. `Ok(None)` means the sequence is exhausted.
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError>;

    /// Stop after at most `max` records.
    fn limit(self, max: u64) -> Limit<Self>
    where
        Self: Sized,
    {
        Limit {
            inner: self,
            remaining: max,
        }
    }
}

#[async_trait]
impl<S: RecordStream + ?Sized> RecordStream for &mut S {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        (**self).next_record().await
    }
}

/// Already-materialized records, e.g. in tests.
#[async_trait]
impl RecordStream for std::vec::IntoIter<Record> {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        Ok(self.next())
    }
}

/// Stream adaptor returned by [`RecordStream::limit`].
///
/// Once the limit is reached the inner stream is not advanced again.
pub struct Limit<S> {
    inner: S,
    remaining: u64,
}

#[async_trait]
impl<S: RecordStream> RecordStream for Limit<S> {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let next = self.inner.next_record().await?;
        if next.is_some() {
            self.remaining -= 1;
        }
        Ok(next)
    }
}

/// Drain a stream, returning how many records it produced.
pub async fn count_records<S: RecordStream>(mut stream: S) -> Result<u64, EtlError> {
    let mut n = 0u64;
    while stream.next_record().await?.is_some() {
        n += 1;
    }
    Ok(n)
}
