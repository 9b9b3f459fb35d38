pub mod reader;

use futures::stream::{Stream, StreamExt};
use std::future::Future;

use crate::errors::SourceError;

pub use reader::{FileChainSource, ReaderSource};

/// An ordered, possibly unbounded sequence of lines.
///
/// Lines are raw bytes: decoding is left to record validation, so a line that
/// is not valid UTF-8 is rejected there instead of being rewritten here.
/// `Ok(None)` marks the end of input. Line terminators are stripped.
pub trait LineSource: Send {
    fn next_line(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SourceError>> + Send;
}

/// Adapts any stream of lines, e.g. `futures::stream::iter` in tests or a
/// channel receiver fed by another task.
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S>
where
    S: Stream + Unpin + Send,
    S::Item: Into<Vec<u8>>,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> LineSource for StreamSource<S>
where
    S: Stream + Unpin + Send,
    S::Item: Into<Vec<u8>>,
{
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.inner.next().await.map(Into::into))
    }
}
