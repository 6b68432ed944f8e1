//! Minimal HTTP/1.1 server on a raw tokio listener.
//!
//! Used where wiremock cannot help: hanging up before responding, observing
//! header casing on the wire, and measuring per-connection concurrency.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the server does with the n-th connection (0-indexed).
#[derive(Debug, Clone)]
pub enum Reply {
    /// Read the request, then close without writing anything.
    Hangup,
    /// Wait `delay`, then send `body` with status 200.
    Ok { delay: Duration, body: &'static str },
}

#[derive(Debug, Default)]
pub struct Stats {
    pub connections: AtomicUsize,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
}

pub struct RawServer {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
}

impl RawServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.stats.requests.lock().unwrap().clone()
    }
}

/// Spawns a server whose behavior per connection is decided by `reply`.
pub async fn spawn<F>(reply: F) -> std::io::Result<RawServer>
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let stats = Arc::new(Stats::default());
    let reply = Arc::new(reply);

    let server_stats = Arc::clone(&stats);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let n = server_stats.connections.fetch_add(1, Ordering::SeqCst);
            let stats = Arc::clone(&server_stats);
            let reply = reply(n);
            tokio::spawn(handle(stream, reply, stats));
        }
    });

    Ok(RawServer { addr, stats })
}

async fn handle(mut stream: TcpStream, reply: Reply, stats: Arc<Stats>) {
    let Some(head) = read_head(&mut stream).await else {
        return;
    };
    stats.requests.lock().unwrap().push(head);

    match reply {
        Reply::Hangup => drop(stream),
        Reply::Ok { delay, body } => {
            let now = stats.current.fetch_add(1, Ordering::SeqCst) + 1;
            stats.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            stats.current.fetch_sub(1, Ordering::SeqCst);

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    }
}

async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return Some(String::from_utf8_lossy(&buf).into_owned());
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
}
