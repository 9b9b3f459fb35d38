use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::{info, warn};

use crate::errors::SourceError;
use crate::source::LineSource;

/// Lines from any buffered async reader, passed on as raw bytes.
pub struct ReaderSource<R> {
    name: String,
    reader: R,
    buf: Vec<u8>,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            buf: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ReaderSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineSource for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| SourceError::Read {
                input: self.name.clone(),
                reason: e.to_string(),
            })?;
        if read == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Ok(Some(std::mem::take(&mut self.buf)))
    }
}

/// Reads a list of files one after another.
///
/// A file that cannot be opened is skipped with a warning, and a read error
/// abandons the rest of that file; neither ends the run.
pub struct FileChainSource {
    pending: VecDeque<PathBuf>,
    current: Option<ReaderSource<BufReader<File>>>,
    position: usize,
    total: usize,
}

impl FileChainSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let pending: VecDeque<PathBuf> = paths.into_iter().collect();
        let total = pending.len();
        Self {
            pending,
            current: None,
            position: 0,
            total,
        }
    }
}

impl LineSource for FileChainSource {
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_line().await {
                    Ok(Some(line)) => return Ok(Some(line)),
                    Ok(None) => self.current = None,
                    Err(e) => {
                        warn!(error = %e, "abandoning rest of input file");
                        self.current = None;
                    }
                }
                continue;
            }

            let Some(path) = self.pending.pop_front() else {
                return Ok(None);
            };
            self.position += 1;
            match File::open(&path).await {
                Ok(file) => {
                    info!(
                        file = %path.display(),
                        position = self.position,
                        total = self.total,
                        "processing input file"
                    );
                    self.current = Some(ReaderSource::new(
                        path.display().to_string(),
                        BufReader::new(file),
                    ));
                }
                Err(e) => {
                    let err = SourceError::Open {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "skipping input file");
                }
            }
        }
    }
}
