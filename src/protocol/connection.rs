use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use super::command::Command;
use super::record::validate_key;
use super::response::parse_delete_reply;
use super::response::parse_store_reply;
use super::response::GetParser;
use super::response::GetReply;
use crate::constants::DELETE_TERMINALS;
use crate::constants::RESP_STORED;
use crate::constants::RESP_VERSION;
use crate::CacheClient;
use crate::DeleteOutcome;
use crate::Hit;
use crate::Metadata;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::NodeConfig;
use crate::Op;
use crate::ProtocolError;
use crate::Record;
use crate::Result;
use crate::StoreOutcome;
use crate::TimeoutError;

/// One stream bound to one cache node.
///
/// Exchanges are strictly sequential: a request is written and its reply
/// read to the terminal line before the next request may start. Each
/// exchange is bounded by the configured request timeout; once an exchange
/// times out the connection refuses further work, since a late reply would
/// otherwise be read as the answer to the next request.
pub struct Connection<S = TcpStream> {
    node: String,
    stream: BufStream<S>,
    request_timeout: Duration,
    transcript: Vec<u8>,
    desynchronized: bool,
}

impl Connection<TcpStream> {
    pub async fn connect(
        node: &NodeConfig,
        network: &NetworkConfig,
    ) -> Result<Self> {
        Self::connect_addr(node.label(), &node.address(), network).await
    }

    /// addr: "127.0.0.1:11211" or "cache-1:11211"
    pub async fn connect_addr(
        label: String,
        addr: &str,
        network: &NetworkConfig,
    ) -> Result<Self> {
        let after = Duration::from_millis(network.connect_timeout_in_ms);
        let stream = match timeout(after, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(NetworkError::ConnectFailed { node: label, source }.into()),
            Err(_) => return Err(NetworkError::ConnectTimeout { node: label, after }.into()),
        };
        if let Err(source) = stream.set_nodelay(network.tcp_nodelay) {
            return Err(NetworkError::ConnectFailed { node: label, source }.into());
        }

        debug!(node = %label, "connected");
        Ok(Self::new(label, stream, network))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        node: impl Into<String>,
        stream: S,
        network: &NetworkConfig,
    ) -> Self {
        Self {
            node: node.into(),
            stream: BufStream::with_capacity(network.buffer_size, network.buffer_size, stream),
            request_timeout: Duration::from_millis(network.request_timeout_in_ms),
            transcript: Vec::new(),
            desynchronized: false,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Liveness check; returns the server's version text.
    pub async fn version(&mut self) -> Result<String> {
        let line = self.line_exchange(Op::Version, "", Command::Version).await?;
        match line.strip_prefix(RESP_VERSION) {
            Some(version) if version.is_empty() || version.starts_with(' ') => Ok(version.trim().to_string()),
            _ => Err(self.unexpected(Op::Version, "", RESP_VERSION)),
        }
    }

    async fn line_exchange(
        &mut self,
        op: Op,
        key: &str,
        command: Command<'_>,
    ) -> Result<String> {
        self.begin(op, key)?;
        let bound = self.request_timeout;
        let outcome = timeout(bound, self.send_then_read_line(op, key, command)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(op, key)),
        }
    }

    async fn get_exchange(
        &mut self,
        key: &str,
    ) -> Result<GetReply> {
        self.begin(Op::Get, key)?;
        let bound = self.request_timeout;
        let outcome = timeout(bound, self.send_then_read_get(key)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(Op::Get, key)),
        }
    }

    async fn send_then_read_line(
        &mut self,
        op: Op,
        key: &str,
        command: Command<'_>,
    ) -> Result<String> {
        self.send(op, key, command).await?;
        let line = self.read_line(op, key).await?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    async fn send_then_read_get(
        &mut self,
        key: &str,
    ) -> Result<GetReply> {
        self.send(Op::Get, key, Command::Get(key)).await?;
        let mut parser = GetParser::new();
        loop {
            let line = self.read_line(Op::Get, key).await?;
            if parser.feed(&line) {
                return Ok(parser.finish());
            }
        }
    }

    fn begin(
        &mut self,
        op: Op,
        key: &str,
    ) -> Result<()> {
        if self.desynchronized {
            return Err(ProtocolError::Desynchronized {
                node: self.node.clone(),
                op,
                key: key.to_string(),
            }
            .into());
        }
        self.transcript.clear();
        Ok(())
    }

    async fn send(
        &mut self,
        op: Op,
        key: &str,
        command: Command<'_>,
    ) -> Result<()> {
        let request = command.to_bytes();
        let written = async {
            self.stream.write_all(&request).await?;
            self.stream.flush().await
        }
        .await;
        written.map_err(|source| self.io_error(op, key, source))
    }

    /// Reads one line and strips its terminator. A bare LF is accepted.
    async fn read_line(
        &mut self,
        op: Op,
        key: &str,
    ) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let read = self.stream.read_until(b'\n', &mut line).await;
        self.transcript.extend_from_slice(&line);
        let n = read.map_err(|source| self.io_error(op, key, source))?;

        if n == 0 || !line.ends_with(b"\n") {
            return Err(ProtocolError::ConnectionClosed {
                node: self.node.clone(),
                op,
                key: key.to_string(),
                expected: op.expected_reply(),
                raw: self.transcript_text(),
            }
            .into());
        }
        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
        Ok(line)
    }

    fn transcript_text(&self) -> String {
        String::from_utf8_lossy(&self.transcript).into_owned()
    }

    fn timed_out(
        &mut self,
        op: Op,
        key: &str,
    ) -> crate::Error {
        self.desynchronized = true;
        warn!(node = %self.node, %op, key, "exchange timed out; connection is now unusable");
        TimeoutError {
            node: self.node.clone(),
            op,
            key: key.to_string(),
            after: self.request_timeout,
            partial: self.transcript_text(),
        }
        .into()
    }

    fn unexpected(
        &self,
        op: Op,
        key: &str,
        expected: &'static str,
    ) -> crate::Error {
        ProtocolError::UnexpectedTerminal {
            node: self.node.clone(),
            op,
            key: key.to_string(),
            expected,
            raw: self.transcript_text(),
        }
        .into()
    }

    fn io_error(
        &self,
        op: Op,
        key: &str,
        source: std::io::Error,
    ) -> crate::Error {
        NetworkError::Io {
            node: self.node.clone(),
            op,
            key: key.to_string(),
            source,
        }
        .into()
    }
}

#[async_trait]
impl<S> CacheClient for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set(
        &mut self,
        record: &Record,
    ) -> Result<StoreOutcome> {
        record.validate()?;
        let line = self.line_exchange(Op::Set, &record.key, Command::Set(record)).await?;
        debug!(node = %self.node, key = %record.key, reply = %line, "set");

        match parse_store_reply(&line) {
            Some(outcome) => Ok(outcome),
            None => {
                // A rejected data block is answered with more than one line
                // (e.g. CLIENT_ERROR then ERROR); the rest would answer the
                // next request.
                self.desynchronized = true;
                warn!(node = %self.node, key = %record.key, reply = %line, "set rejected; connection is now unusable");
                Err(self.unexpected(Op::Set, &record.key, RESP_STORED))
            }
        }
    }

    async fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<Hit>> {
        validate_key(key)?;
        let reply = self.get_exchange(key).await?;
        debug!(node = %self.node, key, raw = %self.transcript_text(), "get");

        match reply {
            GetReply::Absent => Ok(None),
            GetReply::Hit { metadata, value } => match Metadata::parse(&metadata) {
                Some(metadata) => Ok(Some(Hit { metadata, value })),
                None => Err(ProtocolError::MalformedMetadata {
                    node: self.node.clone(),
                    key: key.to_string(),
                    line: metadata,
                    raw: self.transcript_text(),
                }
                .into()),
            },
            GetReply::Malformed { raw } => Err(ProtocolError::MalformedResponse {
                node: self.node.clone(),
                key: key.to_string(),
                expected: Op::Get.expected_reply(),
                raw,
            }
            .into()),
        }
    }

    async fn delete(
        &mut self,
        key: &str,
    ) -> Result<DeleteOutcome> {
        validate_key(key)?;
        let line = self.line_exchange(Op::Delete, key, Command::Delete(key)).await?;
        debug!(node = %self.node, key, reply = %line, "delete");

        parse_delete_reply(&line).ok_or_else(|| self.unexpected(Op::Delete, key, DELETE_TERMINALS))
    }
}
