//! Worker-side control channel reader

use drover_api::ControlMessage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::{debug, warn};

use crate::{IpcError, IpcResult, decode_line};

/// Reads control messages line by line
pub struct ControlReader<R> {
    reader: R,
    line: String,
}

impl ControlReader<BufReader<Stdin>> {
    /// Read from this process's stdin, where the master writes
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> ControlReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// Wait for the next valid message.
    ///
    /// Malformed lines are logged and skipped. Returns
    /// [`IpcError::ConnectionClosed`] at end of input.
    pub async fn next(&mut self) -> IpcResult<ControlMessage> {
        loop {
            self.line.clear();
            let n = self.reader.read_line(&mut self.line).await?;
            if n == 0 {
                debug!("Control channel closed (EOF)");
                return Err(IpcError::ConnectionClosed);
            }

            match decode_line(&self.line) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid control message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_api::ShutdownSignal;

    #[tokio::test]
    async fn reads_messages_and_skips_noise() {
        let input = concat!(
            "\n",
            "not json\n",
            "{\"destination\":\"shutdown\",\"event\":\"interrupt\"}\n",
            "{\"destination\":\"shutdown\",\"event\":\"terminate\"}\n",
        );
        let mut reader = ControlReader::new(BufReader::new(input.as_bytes()));

        assert_eq!(
            reader.next().await.unwrap(),
            ControlMessage::shutdown(ShutdownSignal::Interrupt)
        );
        assert_eq!(
            reader.next().await.unwrap(),
            ControlMessage::shutdown(ShutdownSignal::Terminate)
        );
        assert!(matches!(
            reader.next().await,
            Err(IpcError::ConnectionClosed)
        ));
    }
}
