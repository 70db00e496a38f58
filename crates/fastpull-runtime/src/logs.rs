//! Line-oriented forwarding of container output.
//!
//! Each output pipe gets its own reader task. Readers forward complete
//! lines as they arrive and stop as soon as the consumer goes away, so a
//! cancelled benchmark does not keep draining a `logs -f` follower.
//!
//! Container output is not guaranteed to be UTF-8 (progress bars, binary
//! dumps). Invalid bytes are replaced rather than ending the stream.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Newline-delimited reader that decodes each line lossily.
#[derive(Debug)]
pub struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    /// Wraps `reader`.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Returns the next line without its `\n` or `\r\n` terminator, or
    /// `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; decoding never fails.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            let _ = self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                let _ = self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Spawns a task forwarding each line of `reader` to `tx`.
///
/// The task ends on EOF, on a read error, or when the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LossyLines::new(reader);
        loop {
            tokio::select! {
                () = tx.closed() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "log reader stopped");
                        break;
                    }
                },
            }
        }
    })
}
