//! Outbound JSON-RPC calls
//!
//! A client is only an endpoint plus a service name; creating one performs no
//! I/O. Every call opens its own connection, writes one request line, waits
//! for the matching response line and closes the connection again.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

use super::message::{RpcRequest, RpcResponse, MAX_FRAME_LEN};
use crate::config::DEFAULT_CONNECT_TIMEOUT;
use crate::error::{RtiError, RtiResult};

/// Connection settings for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcClientConfig {
    /// Bound on opening the TCP connection
    pub connect_timeout: Duration,
    /// Bound on waiting for the response; `None` waits indefinitely
    pub response_timeout: Option<Duration>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
        }
    }
}

/// Lazy handle to one remote service
#[derive(Debug, Clone)]
pub struct RpcClient {
    endpoint: SocketAddr,
    service: &'static str,
    config: RpcClientConfig,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Create a handle; no connection is made until the first call
    pub fn new(endpoint: SocketAddr, service: &'static str, config: RpcClientConfig) -> Self {
        Self {
            endpoint,
            service,
            config,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Remote address
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Service prefix of every method name
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Call `method` using the configured response bound
    pub async fn call(&self, method: &str, params: Vec<Value>) -> RtiResult<Value> {
        self.call_with_timeout(method, params, self.config.response_timeout)
            .await
    }

    /// Call `method`, waiting at most `response_timeout` for the answer
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        response_timeout: Option<Duration>,
    ) -> RtiResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::call(id, format!("{}.{}", self.service, method), params);

        let mut framed = self.open().await?;
        trace!(endpoint = %self.endpoint, method = %request.method, id, "Sending request");
        framed.send(request.to_line()?).await?;

        let line = match response_timeout {
            Some(after) => tokio::time::timeout(after, next_frame(&mut framed))
                .await
                .map_err(|_| RtiError::Timeout {
                    operation: "response",
                    after,
                })??,
            None => next_frame(&mut framed).await?,
        };

        let response = RpcResponse::from_line(&line)?;
        if response.id != Value::from(id) {
            return Err(RtiError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }

        Ok(response.into_result()?)
    }

    /// Send `method` as a notification; returns once the frame is written
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> RtiResult<()> {
        let request = RpcRequest::notification(format!("{}.{}", self.service, method), params);
        let mut framed = self.open().await?;
        framed.send(request.to_line()?).await?;
        SinkExt::<String>::close(&mut framed).await?;
        Ok(())
    }

    async fn open(&self) -> RtiResult<Framed<TcpStream, LinesCodec>> {
        let after = self.config.connect_timeout;
        let stream = tokio::time::timeout(after, TcpStream::connect(self.endpoint))
            .await
            .map_err(|_| RtiError::Timeout {
                operation: "connect",
                after,
            })??;
        stream.set_nodelay(true)?;
        Ok(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_FRAME_LEN),
        ))
    }
}

async fn next_frame(framed: &mut Framed<TcpStream, LinesCodec>) -> RtiResult<String> {
    while let Some(line) = framed.next().await {
        let line = line?;
        if !line.trim().is_empty() {
            return Ok(line);
        }
    }
    Err(RtiError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Accept one connection, read one line, answer with `reply(line)`
    async fn one_shot_peer<F>(reply: F) -> SocketAddr
    where
        F: FnOnce(String) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if let Some(answer) = reply(line) {
                writer.write_all(answer.as_bytes()).await.unwrap();
                writer.write_all(b"\n").await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let addr = one_shot_peer(|line| {
            let request = RpcRequest::from_line(line.trim()).unwrap();
            assert_eq!(request.method, "scheduler.ready");
            Some(RpcResponse::success(request.id.unwrap(), Value::Null).to_line().unwrap())
        })
        .await;

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        assert_eq!(client.call("ready", vec![]).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let addr = one_shot_peer(|line| {
            let request = RpcRequest::from_line(line.trim()).unwrap();
            Some(
                RpcResponse::failure(
                    request.id.unwrap(),
                    crate::rpc::RpcError::method_not_found(&request.method),
                )
                .to_line()
                .unwrap(),
            )
        })
        .await;

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        let err = client.call("nope", vec![]).await.unwrap_err();
        assert!(matches!(err, RtiError::Remote(e) if e.code == -32601));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_error() {
        let addr = one_shot_peer(|_| {
            Some(RpcResponse::success(Value::from(999u64), Value::Null).to_line().unwrap())
        })
        .await;

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        let err = client.call("ready", vec![]).await.unwrap_err();
        assert!(matches!(err, RtiError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_peer_closing_without_answer() {
        let addr = one_shot_peer(|_| None).await;

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        let err = client.call("ready", vec![]).await.unwrap_err();
        assert!(matches!(err, RtiError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        let err = client.call("ready", vec![]).await.unwrap_err();
        assert!(matches!(err, RtiError::Io(_)));
    }

    #[tokio::test]
    async fn test_response_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _peer = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = RpcClient::new(addr, "scheduler", RpcClientConfig::default());
        let err = client
            .call_with_timeout("ready", vec![], Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, RtiError::Timeout { operation: "response", .. }));
    }

    #[test]
    fn test_new_performs_no_io() {
        // Nothing listens here; construction must still succeed
        let client = RpcClient::new(
            "127.0.0.1:9".parse().unwrap(),
            "scheduler",
            RpcClientConfig::default(),
        );
        assert_eq!(client.service(), "scheduler");
        assert_eq!(client.endpoint().port(), 9);
    }
}
