//! A multiplexed, bidirectional JSON-lines connection.
//!
//! Both ends make calls and serve calls over the same pair of pipes. A
//! writer task owns the outgoing half and drains a channel of frames; a
//! reader task resolves responses against the pending calls and hands
//! requests to the [`Broker`].

use crate::broker::Broker;
use crate::error::ProtocolError;
use crate::protocol::{Code, Frame, Request, Response, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// One end of a connection. Dropping it closes the outgoing half once the
/// queued frames are written.
#[derive(Debug)]
pub struct Connection {
    outgoing: mpsc::UnboundedSender<Frame>,
    pending: Pending,
    broker: Arc<Broker>,
    next_id: AtomicU64,
}

impl Connection {
    /// Starts the reader and writer tasks on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, frames) = mpsc::unbounded_channel();
        let pending = Pending::default();
        let broker = Arc::new(Broker::new());

        tokio::spawn(write_frames(writer, frames));
        tokio::spawn(read_frames(
            reader,
            Arc::clone(&pending),
            Arc::clone(&broker),
            outgoing.downgrade(),
        ));

        Self {
            outgoing,
            pending,
            broker,
            next_id: AtomicU64::new(1),
        }
    }

    /// The broker routing incoming requests.
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Calls `method` on the service listening on `stream`.
    ///
    /// # Errors
    ///
    /// Returns the peer's error, or [`ProtocolError::Closed`] if the
    /// connection ends first.
    pub async fn call(
        &self,
        stream: u32,
        method: &str,
        params: Value,
    ) -> Result<Value, ProtocolError> {
        let (id, rx) = self.start_call(stream, method, params)?;
        // Dropping this future before the response arrives must not leak the entry.
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };
        let response = rx.await.map_err(|_| ProtocolError::Closed)?;
        Ok(response.into_result()?)
    }

    /// Like [`Connection::call`], for threads outside the runtime such as
    /// `spawn_blocking` workers.
    ///
    /// # Errors
    ///
    /// See [`Connection::call`].
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous context.
    pub fn call_blocking(
        &self,
        stream: u32,
        method: &str,
        params: Value,
    ) -> Result<Value, ProtocolError> {
        let (_, rx) = self.start_call(stream, method, params)?;
        let response = rx.blocking_recv().map_err(|_| ProtocolError::Closed)?;
        Ok(response.into_result()?)
    }

    /// Answers a request received from the broker.
    pub fn respond(&self, request: &Request, result: Result<Value, RpcError>) {
        if let Err(err) = &result {
            debug!(method = %request.method, code = %err.code, "Call failed: {}", err.message);
        }
        let response = Response::new(request.stream, request.id, result);
        if self.outgoing.send(Frame::Response(response)).is_err() {
            debug!(method = %request.method, "Dropped response on closed connection");
        }
    }

    fn start_call(
        &self,
        stream: u32,
        method: &str,
        params: Value,
    ) -> Result<(u64, oneshot::Receiver<Response>), ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        trace!(id, stream, method, "Sending request");
        let request = Request {
            id,
            stream,
            method: method.to_string(),
            params,
        };
        if self.outgoing.send(Frame::Request(request)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(ProtocolError::Closed);
        }
        Ok((id, rx))
    }

    #[cfg(test)]
    fn pending_calls(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Removes an abandoned call from the pending table.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = match serde_json::to_vec(&frame) {
            Ok(line) => line,
            Err(err) => {
                warn!("Failed to encode frame: {err}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(err) = writer.write_all(&line).await {
            debug!("Connection write failed: {err}");
            break;
        }
        if let Err(err) = writer.flush().await {
            debug!("Connection flush failed: {err}");
            break;
        }
    }
    // Closing our half tells the peer we are done.
    let _ = writer.shutdown().await;
}

async fn read_frames<R>(
    reader: R,
    pending: Pending,
    broker: Arc<Broker>,
    outgoing: mpsc::WeakUnboundedSender<Frame>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!("Connection read failed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Frame>(&line) {
            Ok(Frame::Response(response)) => {
                match lock(&pending).remove(&response.id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(id = response.id, "Response to unknown request"),
                }
            }
            Ok(Frame::Request(request)) => {
                trace!(id = request.id, stream = request.stream, method = %request.method, "Received request");
                if let Err(request) = broker.route(request) {
                    let error = RpcError::new(
                        Code::NotFound,
                        format!("no service on stream {}", request.stream),
                    );
                    let response = Response::new(request.stream, request.id, Err(error));
                    if let Some(outgoing) = outgoing.upgrade() {
                        let _ = outgoing.send(Frame::Response(response));
                    }
                }
            }
            Err(err) => warn!("Ignoring malformed frame: {err}"),
        }
    }
    debug!("Connection closed by peer");
    // Dropping the senders fails every call still waiting.
    lock(&pending).clear();
    broker.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair() -> (Connection, Connection) {
        let (a, b) = tokio::io::duplex(4096);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            Connection::spawn(a_read, a_write),
            Connection::spawn(b_read, b_write),
        )
    }

    #[tokio::test]
    async fn test_call_and_respond() {
        let (client, server) = pair();
        let (_registration, mut requests) = server.broker().listen(0);
        let serve = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(request.method, "Echo");
            server.respond(&request, Ok(request.params.clone()));
            server
        });

        let result = client.call(0, "Echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_response() {
        let (client, server) = pair();
        let (_registration, mut requests) = server.broker().listen(0);
        tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            server.respond(&request, Err(RpcError::new(Code::Aborted, "boom")));
        });

        let err = client.call(0, "Check", Value::Null).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Aborted));
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let (client, _server) = pair();
        let err = client.call(42, "GetFiles", Value::Null).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::NotFound));
        assert_eq!(err.to_string(), "no service on stream 42");
    }

    #[tokio::test]
    async fn test_abandoned_call_is_forgotten() {
        let (client, server) = pair();
        let (_registration, mut requests) = server.broker().listen(0);

        let call = client.call(0, "Check", Value::Null);
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), call).await;
        assert!(timed_out.is_err());
        assert_eq!(client.pending_calls(), 0);

        // A late response for the abandoned id is dropped by the reader.
        let request = requests.recv().await.unwrap();
        server.respond(&request, Ok(Value::Null));
        let serve = async {
            let next = requests.recv().await.unwrap();
            server.respond(&next, Ok(json!("second")));
        };
        let (result, ()) = tokio::join!(client.call(0, "Check", Value::Null), serve);
        assert_eq!(result.unwrap(), json!("second"));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_closed_connection_fails_pending_calls() {
        let (client, server) = pair();
        let (_registration, mut requests) = server.broker().listen(0);
        tokio::spawn(async move {
            let _request = requests.recv().await;
            drop(server);
        });

        let err = client.call(0, "GetName", Value::Null).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Closed));
    }
}
