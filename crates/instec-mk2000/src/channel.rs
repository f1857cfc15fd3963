//! Command channel: one request/reply cycle at a time over a [`Transport`].
//!
//! The controller processes one command at a time and never sends anything
//! unsolicited, so the channel is a plain half-duplex exchange. The transport
//! sits behind a `tokio::sync::Mutex` held for the whole send+receive cycle;
//! concurrent callers queue on the lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use instec_core::error::{Error, Result};
use instec_core::transport::Transport;

use crate::protocol::{self, MAX_REPLY_LEN};

/// Default time to wait for each chunk of a reply.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed `query`/`write` access to a controller.
pub struct CommandChannel {
    transport: Arc<Mutex<Box<dyn Transport>>>,
    read_timeout: Duration,
}

impl CommandChannel {
    pub fn new(transport: Box<dyn Transport>, read_timeout: Duration) -> Self {
        CommandChannel {
            transport: Arc::new(Mutex::new(transport)),
            read_timeout,
        }
    }

    pub async fn open(&self) -> Result<()> {
        self.transport.lock().await.open().await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }

    /// Probe the link. See [`Transport::is_alive`].
    pub async fn is_alive(&self) -> bool {
        self.transport.lock().await.is_alive().await
    }

    /// Send `cmd` and return its reply with the `\r\n` terminator removed.
    ///
    /// Reads are repeated until the accumulated reply ends with the
    /// terminator. Any failure while reading (timeout, lost link, oversized
    /// reply) is [`Error::ReceiveFailed`] and is not retried.
    pub async fn query(&self, cmd: &str) -> Result<String> {
        let mut transport = self.transport.lock().await;

        debug!(cmd = %cmd, "query");
        transport.send(&protocol::encode_command(cmd)).await?;

        let mut buf = [0u8; 512];
        let mut reply = Vec::new();
        while !protocol::is_complete(&reply) {
            let n = match transport.receive(&mut buf, self.read_timeout).await {
                Ok(0) => {
                    return Err(Error::ReceiveFailed(format!(
                        "link closed during reply to {cmd}"
                    )));
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(cmd = %cmd, error = %e, partial = reply.len(), "reply incomplete");
                    return Err(Error::ReceiveFailed(format!("{cmd}: {e}")));
                }
            };
            reply.extend_from_slice(&buf[..n]);
            if reply.len() > MAX_REPLY_LEN {
                return Err(Error::ReceiveFailed(format!(
                    "reply to {cmd} exceeds {MAX_REPLY_LEN} bytes without terminator"
                )));
            }
        }

        let text = protocol::decode_reply(&reply)?;
        trace!(cmd = %cmd, reply = %text, "reply");
        Ok(text)
    }

    /// Send `cmd` without waiting for a reply.
    pub async fn write(&self, cmd: &str) -> Result<()> {
        let mut transport = self.transport.lock().await;
        debug!(cmd = %cmd, "write");
        transport.send(&protocol::encode_command(cmd)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instec_test_harness::{MockTcpServer, MockTransport, SimulatedController};
    use instec_transport::TcpTransport;

    const RTIN: &[u8] = b"MK#1:25.0:24.9:50.0:50.0:5.0:12.3:1:0,0,0:0\r\n";

    fn channel(mock: MockTransport) -> CommandChannel {
        CommandChannel::new(Box::new(mock), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn query_returns_reply_without_terminator() {
        let mut mock = MockTransport::new();
        mock.expect(b"TEMP:RTIN?\n", RTIN);
        let ch = channel(mock);
        assert_eq!(
            ch.query("TEMP:RTIN?").await.unwrap(),
            "MK#1:25.0:24.9:50.0:50.0:5.0:12.3:1:0,0,0:0"
        );
    }

    #[tokio::test]
    async fn chunked_replies_reassemble_identically() {
        let single = {
            let mut mock = MockTransport::new();
            mock.expect(b"TEMP:RTIN?\n", RTIN);
            channel(mock).query("TEMP:RTIN?").await.unwrap()
        };

        for chunk in 1..=RTIN.len() {
            let mut mock = MockTransport::new();
            mock.set_chunk_size(chunk);
            mock.expect(b"TEMP:RTIN?\n", RTIN);
            let reply = channel(mock).query("TEMP:RTIN?").await.unwrap();
            assert_eq!(reply, single, "chunk size {chunk}");
        }
    }

    #[tokio::test]
    async fn terminator_split_across_reads() {
        let mut mock = MockTransport::new();
        mock.set_chunk_size(6);
        // "41.25\r" then "\n": the first read ends on a lone CR.
        mock.expect(b"TEMP:TP?\n", b"41.25\r\n");
        assert_eq!(channel(mock).query("TEMP:TP?").await.unwrap(), "41.25");
    }

    #[tokio::test]
    async fn missing_terminator_is_receive_failed() {
        let mut mock = MockTransport::new();
        mock.expect(b"TEMP:SNUM?\n", b"A1B2C3");
        let result = channel(mock).query("TEMP:SNUM?").await;
        assert!(matches!(result, Err(Error::ReceiveFailed(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn no_reply_is_receive_failed() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"TEMP:SNUM?\n");
        let result = channel(mock).query("TEMP:SNUM?").await;
        assert!(matches!(result, Err(Error::ReceiveFailed(_))));
    }

    #[tokio::test]
    async fn oversized_reply_is_receive_failed() {
        let mut mock = MockTransport::new();
        mock.expect(b"TEMP:CTEM?\n", &vec![b'1'; MAX_REPLY_LEN + 10]);
        let result = channel(mock).query("TEMP:CTEM?").await;
        assert!(matches!(result, Err(Error::ReceiveFailed(_))));
    }

    #[tokio::test]
    async fn write_sends_line_and_does_not_read() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"TEMP:STOP\n");
        let monitor = mock.monitor();
        channel(mock).write("TEMP:STOP").await.unwrap();
        assert_eq!(monitor.sent_lines(), vec!["TEMP:STOP"]);
        assert_eq!(monitor.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn closed_channel_rejects_writes() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);
        let ch = channel(mock);
        assert!(matches!(ch.write("TEMP:STOP").await, Err(Error::NotConnected)));
        assert!(!ch.is_alive().await);

        ch.open().await.unwrap();
        assert!(ch.is_alive().await);
    }

    #[tokio::test]
    async fn concurrent_queries_are_serialised() {
        let sim = SimulatedController::new().with_chunk_size(3);
        let ch = Arc::new(CommandChannel::new(Box::new(sim), Duration::from_millis(50)));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let ch = Arc::clone(&ch);
            tasks.push(tokio::spawn(async move {
                if n % 2 == 0 {
                    assert_eq!(ch.query("TEMP:SNUM?").await.unwrap(), "SIM0001");
                } else {
                    assert_eq!(
                        ch.query("*IDN?").await.unwrap(),
                        "Instec,MK2000,SIM0001,1.0"
                    );
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn tcp_fragmented_reply() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_fragmented(
            b"TEMP:RTIN?\n",
            &[b"MK#1:25.0:24.9:50", b".0:50.0:5.0:12.3:1:0,0,0:0\r", b"\n"],
        );
        let addr = server.addr().to_string();
        server.start();

        let ch = CommandChannel::new(
            Box::new(TcpTransport::new(&addr)),
            Duration::from_secs(2),
        );
        ch.open().await.unwrap();
        assert_eq!(
            ch.query("TEMP:RTIN?").await.unwrap(),
            "MK#1:25.0:24.9:50.0:50.0:5.0:12.3:1:0,0,0:0"
        );
        ch.close().await.unwrap();
        server.wait().await.unwrap();
    }
}
