//! The single reader task.
//!
//! Pulls frames off the transport one at a time, matches each reply to its
//! pending request by label, and completes the caller. Arrival order is
//! irrelevant; only the label matters.

use crate::base::neterror::NetError;
use crate::bridge::message::{InboundMessage, RequestDescriptor, INIT_LABEL};
use crate::bridge::registry::{Outcome, PendingRegistry};
use crate::bridge::transport::TransportReader;
use crate::http::rawresponse::RawExchange;
use crate::http::response::HttpResponse;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames read off the transport.
    pub frames: u64,
    /// Replies delivered to a registered request.
    pub resolved: u64,
    /// Frames discarded (undecodable or unknown label).
    pub dropped: u64,
    /// Bootstrap replies skipped.
    pub bootstrap: u64,
}

enum FrameOutcome {
    Resolved,
    Dropped,
    Bootstrap,
}

/// Marks the registry closed however the loop exits, including a panic or
/// an aborted task, so callers never keep sending into a dead bridge.
struct CloseOnExit(Arc<PendingRegistry>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        if !self.0.is_closed() {
            tracing::error!(pending = self.0.len(), "dispatch loop ended abnormally");
            self.0.mark_closed();
        }
    }
}

pub struct Dispatcher {
    reader: TransportReader,
    registry: Arc<PendingRegistry>,
    base_url: Url,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(reader: TransportReader, registry: Arc<PendingRegistry>, base_url: Url) -> Self {
        Self {
            reader,
            registry,
            base_url,
            stats: DispatchStats::default(),
        }
    }

    /// Run until the transport closes.
    ///
    /// Closure is the normal end and returns the counters. A bridge-level
    /// fault reported by the engine ends the loop with that error. Either
    /// way the registry is marked closed and requests still pending are left
    /// unresolved.
    pub async fn run(self) -> Result<DispatchStats, NetError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`Dispatcher::run`], but also stops cleanly once `shutdown`
    /// completes.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<DispatchStats, NetError>
    where
        F: Future<Output = ()>,
    {
        let _guard = CloseOnExit(Arc::clone(&self.registry));
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                read = self.reader.read_frame() => Some(read),
                () = &mut shutdown => None,
            };
            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => {
                    tracing::debug!(
                        error = %e,
                        pending = self.registry.len(),
                        frames = self.stats.frames,
                        "engine transport closed, dispatch loop ending"
                    );
                    self.registry.mark_closed();
                    return Ok(self.stats);
                }
                None => {
                    tracing::debug!(
                        pending = self.registry.len(),
                        frames = self.stats.frames,
                        "dispatch loop stopped"
                    );
                    self.registry.mark_closed();
                    return Ok(self.stats);
                }
            };
            self.stats.frames += 1;

            match self.handle_frame(&payload) {
                Ok(FrameOutcome::Resolved) => self.stats.resolved += 1,
                Ok(FrameOutcome::Dropped) => self.stats.dropped += 1,
                Ok(FrameOutcome::Bootstrap) => self.stats.bootstrap += 1,
                Err(fatal) => {
                    tracing::error!(error = %fatal, "engine reported a fatal condition");
                    self.registry.mark_failed(fatal);
                    return Err(fatal);
                }
            }
        }
    }

    fn handle_frame(&self, payload: &[u8]) -> Result<FrameOutcome, NetError> {
        // Frame boundary is intact even if the payload is junk.
        let message = match InboundMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => return Ok(self.fail_undecodable(payload, e)),
        };

        if message.is_bootstrap() {
            tracing::debug!(status = message.status, "engine warm-up reply");
            return Ok(FrameOutcome::Bootstrap);
        }

        let fault = message.fault();
        if fault == Some(NetError::HostResolutionFailure) {
            return Err(NetError::HostResolutionFailure);
        }

        let entry = match self.registry.take(&message.label) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(label = %message.label, error = %e, "reply for unknown request");
                return Ok(FrameOutcome::Dropped);
            }
        };

        let outcome = match fault {
            Some(err) => {
                tracing::debug!(label = %message.label, error = ?message.error, "engine failed request");
                Err(err)
            }
            None => self.build_response(&message, entry.descriptor()),
        };

        if let Err(e) = &outcome {
            tracing::debug!(label = %message.label, error = %e, "request completed with error");
        }
        if !entry.complete(outcome) {
            tracing::debug!(label = %message.label, "caller detached before reply");
        }
        Ok(FrameOutcome::Resolved)
    }

    /// A payload that is not a full message. If its label still names a
    /// pending request, that request fails; otherwise the frame is dropped.
    fn fail_undecodable(&self, payload: &[u8], error: NetError) -> FrameOutcome {
        let label = match InboundMessage::peek_label(payload) {
            Some(label) => label,
            None => {
                tracing::warn!(len = payload.len(), "dropping undecodable frame");
                return FrameOutcome::Dropped;
            }
        };
        if label == INIT_LABEL {
            return FrameOutcome::Bootstrap;
        }

        match self.registry.take(&label) {
            Ok(entry) => {
                tracing::debug!(label = %label, error = %error, "request completed with error");
                if !entry.complete(Err(error)) {
                    tracing::debug!(label = %label, "caller detached before reply");
                }
                FrameOutcome::Resolved
            }
            Err(_) => {
                tracing::warn!(label = %label, len = payload.len(), "dropping undecodable frame");
                FrameOutcome::Dropped
            }
        }
    }

    fn build_response(&self, message: &InboundMessage, descriptor: &RequestDescriptor) -> Outcome {
        let raw = message
            .response
            .clone()
            .ok_or(NetError::MalformedFrame)?
            .into_bytes()?;
        let exchange = RawExchange::parse(raw)?;
        let url = self
            .base_url
            .join(&descriptor.endpoint)
            .map_err(|_| NetError::InvalidUrl)?;

        Ok(HttpResponse::from_exchange(
            message.id,
            message.status,
            message.elapsed(),
            url,
            exchange,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::codec::write_frame;
    use crate::bridge::message::HttpVersion;
    use crate::bridge::registry::CorrelationToken;
    use crate::bridge::transport::split_stream;
    use crate::http::orderedheaders::OrderedHeaderMap;
    use crate::http::rawresponse::ResponseBlob;
    use http::Method;
    use tokio::io::DuplexStream;

    fn descriptor(endpoint: &str) -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            endpoint: endpoint.to_string(),
            headers: OrderedHeaderMap::new(),
            body: None,
            version: HttpVersion::Http11,
        }
    }

    fn reply(label: &str, raw: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&InboundMessage {
            label: label.to_string(),
            status: 200,
            id: 1,
            time: 3.0,
            response: Some(ResponseBlob::encode_base64(raw)),
            error: None,
        })
        .unwrap()
    }

    fn start(
        registry: &Arc<PendingRegistry>,
    ) -> (
        DuplexStream,
        tokio::task::JoinHandle<Result<DispatchStats, NetError>>,
    ) {
        let (local, engine) = tokio::io::duplex(4096);
        let (reader, _writer) = split_stream(local);
        let dispatcher = Dispatcher::new(
            reader,
            Arc::clone(registry),
            Url::parse("https://example.com/base/").unwrap(),
        );
        (engine, tokio::spawn(dispatcher.run()))
    }

    #[tokio::test]
    async fn test_resolves_and_joins_url() {
        let registry = PendingRegistry::new();
        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("items?page=2"))
            .unwrap();
        let (mut engine, task) = start(&registry);

        let frame = reply("t-1", b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello");
        write_frame(&mut engine, &frame).await.unwrap();

        let resp = pending.await.unwrap();
        assert_eq!(resp.url().as_str(), "https://example.com/base/items?page=2");
        assert_eq!(resp.text(), "hello");

        drop(engine);
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.resolved, 1);
        assert!(registry.is_closed());
    }

    #[tokio::test]
    async fn test_bootstrap_and_unknown_are_skipped() {
        let registry = PendingRegistry::new();
        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let (mut engine, task) = start(&registry);

        write_frame(&mut engine, &reply("init", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();
        write_frame(&mut engine, &reply("ghost", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();
        write_frame(&mut engine, b"{ not json").await.unwrap();
        write_frame(&mut engine, &reply("t-1", b"HTTP/1.1 200 OK\r\n\r\nok"))
            .await
            .unwrap();

        assert_eq!(pending.await.unwrap().text(), "ok");
        drop(engine);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.bootstrap, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.resolved, 1);
    }

    #[tokio::test]
    async fn test_malformed_exchange_fails_only_that_request() {
        let registry = PendingRegistry::new();
        let bad = registry
            .register(CorrelationToken::from("bad"), descriptor("/"))
            .unwrap();
        let good = registry
            .register(CorrelationToken::from("good"), descriptor("/"))
            .unwrap();
        let (mut engine, _task) = start(&registry);

        write_frame(&mut engine, &reply("bad", b"HTTP/1.1 200 OK\r\nNoSeparator\r\n\r\n"))
            .await
            .unwrap();
        write_frame(&mut engine, &reply("good", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();

        assert_eq!(bad.await.unwrap_err(), NetError::MalformedFrame);
        assert!(good.await.is_ok());
    }

    #[tokio::test]
    async fn test_host_resolution_failure_ends_loop() {
        let registry = PendingRegistry::new();
        let _pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let (mut engine, task) = start(&registry);

        let frame = serde_json::to_vec(&InboundMessage {
            label: "t-1".into(),
            status: 0,
            id: 0,
            time: 0.0,
            response: None,
            error: Some("UnknownHostException: target.invalid".into()),
        })
        .unwrap();
        write_frame(&mut engine, &frame).await.unwrap();

        assert_eq!(
            task.await.unwrap().unwrap_err(),
            NetError::HostResolutionFailure
        );
        assert!(registry.is_closed());
        assert_eq!(registry.closed_error(), NetError::HostResolutionFailure);
    }

    #[tokio::test]
    async fn test_engine_error_fails_request() {
        let registry = PendingRegistry::new();
        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let (mut engine, _task) = start(&registry);

        let frame = serde_json::to_vec(&InboundMessage {
            label: "t-1".into(),
            status: 0,
            id: 0,
            time: 0.0,
            response: None,
            error: Some("connection reset".into()),
        })
        .unwrap();
        write_frame(&mut engine, &frame).await.unwrap();

        assert_eq!(pending.await.unwrap_err(), NetError::ConnectionFailed);
    }

    #[tokio::test]
    async fn test_signed_byte_list_response() {
        let registry = PendingRegistry::new();
        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let (mut engine, _task) = start(&registry);

        // "HTTP/1.1 200 OK\r\n\r\né" with the body as JVM signed bytes.
        let mut bytes: Vec<i16> = b"HTTP/1.1 200 OK\r\n\r\n".iter().map(|b| *b as i16).collect();
        bytes.extend([-61, -87]);
        let frame = serde_json::to_vec(&serde_json::json!({
            "label": "t-1", "status": 200, "id": 1, "time": 2, "response": bytes,
        }))
        .unwrap();
        write_frame(&mut engine, &frame).await.unwrap();

        let resp = pending.await.unwrap();
        assert_eq!(&resp.bytes()[..], "é".as_bytes());
        assert_eq!(resp.text(), "é");
    }

    #[tokio::test]
    async fn test_bad_field_fails_labelled_request() {
        let registry = PendingRegistry::new();
        let bad = registry
            .register(CorrelationToken::from("bad"), descriptor("/"))
            .unwrap();
        let good = registry
            .register(CorrelationToken::from("good"), descriptor("/"))
            .unwrap();
        let (mut engine, task) = start(&registry);

        write_frame(
            &mut engine,
            br#"{"label":"bad","status":200,"id":1,"time":1,"response":42}"#,
        )
        .await
        .unwrap();
        write_frame(
            &mut engine,
            br#"{"label":"ghost","status":"x","id":1,"time":1}"#,
        )
        .await
        .unwrap();
        write_frame(&mut engine, &reply("good", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();

        assert_eq!(bad.await.unwrap_err(), NetError::MalformedFrame);
        assert!(good.await.is_ok());
        assert!(registry.is_empty());

        drop(engine);
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_huge_elapsed_time_does_not_kill_loop() {
        let registry = PendingRegistry::new();
        let first = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let second = registry
            .register(CorrelationToken::from("t-2"), descriptor("/"))
            .unwrap();
        let (mut engine, _task) = start(&registry);

        let mut message: serde_json::Value =
            serde_json::from_slice(&reply("t-1", b"HTTP/1.1 200 OK\r\n\r\n")).unwrap();
        message["time"] = serde_json::json!(1e300);
        write_frame(&mut engine, &serde_json::to_vec(&message).unwrap())
            .await
            .unwrap();
        write_frame(&mut engine, &reply("t-2", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();

        assert_eq!(first.await.unwrap().elapsed(), std::time::Duration::MAX);
        assert!(second.await.is_ok());
        assert!(!registry.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_returns_stats() {
        let registry = PendingRegistry::new();
        let (local, mut engine) = tokio::io::duplex(4096);
        let (reader, _writer) = split_stream(local);
        let dispatcher = Dispatcher::new(
            reader,
            Arc::clone(&registry),
            Url::parse("https://example.com/").unwrap(),
        );
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(dispatcher.run_until(async move {
            let _ = stopped.await;
        }));

        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        write_frame(&mut engine, &reply("t-1", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();
        assert!(pending.await.is_ok());

        // Engine side stays open; the loop stops on the signal alone.
        stop.send(()).unwrap();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.resolved, 1);
        assert!(registry.is_closed());
        drop(engine);
    }

    #[tokio::test]
    async fn test_aborted_loop_closes_registry() {
        let registry = PendingRegistry::new();
        let pending = registry
            .register(CorrelationToken::from("t-1"), descriptor("/"))
            .unwrap();
        let (mut engine, task) = start(&registry);

        // A delivered reply proves the loop is running.
        write_frame(&mut engine, &reply("t-1", b"HTTP/1.1 200 OK\r\n\r\n"))
            .await
            .unwrap();
        assert!(pending.await.is_ok());
        assert!(!registry.is_closed());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(registry.is_closed());
    }
}
