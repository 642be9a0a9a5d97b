//! In-process cache node speaking the memcached text protocol.
//!
//! Nodes started on the same [`SharedStore`] behave like a settled cluster;
//! a node with its own store behaves like one that missed rebalancing.
//! Depends only on tokio and parking_lot so integration tests can include
//! it with `#[path]`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub flag: u32,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<HashMap<String, StoredItem>>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<StoredItem> {
        self.inner.lock().get(key).cloned()
    }

    pub fn insert(
        &self,
        key: &str,
        flag: u32,
        value: &[u8],
    ) {
        self.inner.lock().insert(
            key.to_string(),
            StoredItem {
                flag,
                value: value.to_vec(),
            },
        );
    }

    pub fn remove(
        &self,
        key: &str,
    ) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Wire-level misbehaviour injected into `get` and other replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireQuirk {
    #[default]
    None,
    /// Declared length is off by the given amount
    LengthSkew(i64),
    /// `VALUE <key> <flag><len>` with no separator
    FusedFlagLength,
    /// Two spaces between key and flag
    DoubleSpaced,
    /// `get` answers the VALUE header for a different key
    WrongKey,
    /// Reads requests but never replies
    Silent,
    /// Answers `delete` with a server error
    DeleteFails,
}

pub struct MockCacheNode {
    addr: SocketAddr,
    store: SharedStore,
    quirk: Arc<Mutex<WireQuirk>>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MockCacheNode {
    pub async fn start(
        store: SharedStore,
        quirk: WireQuirk,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let quirk = Arc::new(Mutex::new(quirk));

        let handle = tokio::spawn(serve(listener, store.clone(), quirk.clone(), shutdown_rx));
        Ok(Self {
            addr,
            store,
            quirk,
            shutdown_tx,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Changes the quirk for every later request, on every connection.
    pub fn set_quirk(
        &self,
        quirk: WireQuirk,
    ) {
        *self.quirk.lock() = quirk;
    }

    /// Stops accepting and closes open connections.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        let _ = (&mut self.handle).await;
    }
}

impl Drop for MockCacheNode {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

async fn serve(
    listener: TcpListener,
    store: SharedStore,
    quirk: Arc<Mutex<WireQuirk>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { break };
                connections.push(tokio::spawn(handle_connection(stream, store.clone(), quirk.clone())));
            }
        }
    }
    for connection in connections {
        connection.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    store: SharedStore,
    quirk: Arc<Mutex<WireQuirk>>,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let active = *quirk.lock();

        let reply = match tokens.as_slice() {
            ["set", key, flag, _exptime, length] => {
                let (Ok(flag), Ok(length)) = (flag.parse::<u32>(), length.parse::<usize>()) else {
                    write.write_all(b"CLIENT_ERROR bad command line format\r\n").await?;
                    continue;
                };
                let mut payload = vec![0u8; length + 2];
                reader.read_exact(&mut payload).await?;
                payload.truncate(length);
                store.insert(key, flag, &payload);
                b"STORED\r\n".to_vec()
            }
            ["get", key] => match store.get(key) {
                Some(item) => render_hit(key, &item, active),
                None => b"END\r\n".to_vec(),
            },
            ["delete", _] if active == WireQuirk::DeleteFails => b"SERVER_ERROR out of memory\r\n".to_vec(),
            ["delete", key] => {
                if store.remove(key) {
                    b"DELETED\r\n".to_vec()
                } else {
                    b"NOT_FOUND\r\n".to_vec()
                }
            }
            ["version"] => b"VERSION 1.6.21-mock\r\n".to_vec(),
            _ => b"ERROR\r\n".to_vec(),
        };

        if active != WireQuirk::Silent {
            write.write_all(&reply).await?;
            write.flush().await?;
        }
    }
}

fn render_hit(
    key: &str,
    item: &StoredItem,
    quirk: WireQuirk,
) -> Vec<u8> {
    let length = item.value.len();
    let header = match quirk {
        WireQuirk::LengthSkew(skew) => format!("VALUE {key} {} {}", item.flag, length as i64 + skew),
        WireQuirk::FusedFlagLength => format!("VALUE {key} {}{length}", item.flag),
        WireQuirk::DoubleSpaced => format!("VALUE {key}  {} {length}", item.flag),
        WireQuirk::WrongKey => format!("VALUE {key}x {} {length}", item.flag),
        _ => format!("VALUE {key} {} {length}", item.flag),
    };

    let mut reply = Vec::with_capacity(header.len() + length + 9);
    reply.extend_from_slice(header.as_bytes());
    reply.extend_from_slice(b"\r\n");
    reply.extend_from_slice(&item.value);
    reply.extend_from_slice(b"\r\nEND\r\n");
    reply
}
