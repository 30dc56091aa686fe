//! Byte streamer
//!
//! Copies an inclusive byte interval of a file into a response body and
//! reports the transfer's outcome once the last byte has been handed to the
//! transport, or as soon as a read fails.

use futures::Stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::StatusCode;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::archive::TempArchive;
use super::outcome::{report_stream_failure, report_success, Events};
use crate::error::ServeError;
use crate::http::{HeaderSet, ServeBody};

const CHUNK_SIZE: usize = 64 * 1024;

/// Completion hook of one transfer.
///
/// Owns the temporary archive being streamed, if any, so the file is removed
/// whether the transfer succeeds, fails, or the client goes away and the body
/// is dropped half-way.
pub struct Completion {
    events: Events,
    status: StatusCode,
    headers: HeaderSet,
    temp: Option<TempArchive>,
}

impl Completion {
    pub const fn new(
        events: Events,
        status: StatusCode,
        headers: HeaderSet,
        temp: Option<TempArchive>,
    ) -> Self {
        Self {
            events,
            status,
            headers,
            temp,
        }
    }

    fn succeed(mut self) {
        drop(self.temp.take());
        report_success(&self.events, self.status, self.headers);
    }

    fn fail(mut self, error: &io::Error) {
        drop(self.temp.take());
        let error = ServeError::StreamFailure(io::Error::new(error.kind(), error.to_string()));
        report_stream_failure(&self.events, &error, self.headers);
    }
}

/// Stream `len` bytes of `path` starting at `start`.
///
/// A read error or a file that turns out shorter than announced ends the body
/// with an error, which makes hyper abort the connection: the status line has
/// already been sent and cannot be replaced.
pub fn stream_range(path: PathBuf, start: u64, len: u64, completion: Completion) -> ServeBody {
    StreamBody::new(range_frames(path, start, len, completion)).boxed_unsync()
}

fn range_frames(
    path: PathBuf,
    start: u64,
    len: u64,
    completion: Completion,
) -> impl Stream<Item = io::Result<Frame<Bytes>>> {
    async_stream::stream! {
        let mut file = match open_at(&path, start).await {
            Ok(file) => file,
            Err(e) => {
                completion.fail(&e);
                yield Err(e);
                return;
            }
        };

        let mut remaining = len;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut failure = None;

        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE));
            match file.read(&mut buf[..want]).await {
                Ok(0) => {
                    failure = Some(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} ended {remaining} bytes early", path.display()),
                    ));
                    break;
                }
                Ok(n) => {
                    remaining -= n as u64;
                    yield Ok(Frame::data(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            None => completion.succeed(),
            Some(e) => {
                completion.fail(&e);
                yield Err(e);
            }
        }
    }
}

async fn open_at(path: &Path, start: u64) -> io::Result<tokio::fs::File> {
    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    Ok(file)
}
