//! In-process stand-in for the request engine.
//!
//! The launcher connects back to the client's port from a tokio task and
//! hands the engine side of the connection to the test, which then plays
//! the engine frame by frame.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use turbonet::base::neterror::NetError;
use turbonet::bridge::codec::encode_frame;
use turbonet::bridge::engine::{EngineConfig, EngineHandle, EngineLauncher, LaunchContext};
use turbonet::bridge::message::{InboundMessage, OutboundMessage};
use turbonet::bridge::transport::{split_stream, TransportReader, TransportWriter};
use turbonet::http::rawresponse::ResponseBlob;
use turbonet::Client;

/// What the fake engine sees at launch.
pub struct EngineSide {
    pub reader: TransportReader,
    pub writer: TransportWriter,
    pub base_url: String,
    pub config: EngineConfig,
}

pub struct LoopbackEngine {
    tx: Mutex<Option<oneshot::Sender<EngineSide>>>,
}

impl LoopbackEngine {
    pub fn new() -> (Self, oneshot::Receiver<EngineSide>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl EngineLauncher for LoopbackEngine {
    fn launch(&self, ctx: &LaunchContext<'_>) -> Result<Box<dyn EngineHandle>, NetError> {
        let tx = self
            .tx
            .lock()
            .unwrap()
            .take()
            .ok_or(NetError::EngineUnavailable)?;
        let port = ctx.port;
        let base_url = ctx.base_url.to_string();
        let config = ctx.config.clone();

        let task = tokio::spawn(async move {
            let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let (reader, writer) = split_stream(stream);
            let _ = tx.send(EngineSide {
                reader,
                writer,
                base_url,
                config,
            });
        });
        Ok(Box::new(TaskHandle(task)))
    }
}

/// Launcher that never connects back.
pub struct SilentEngine;

impl EngineLauncher for SilentEngine {
    fn launch(&self, _ctx: &LaunchContext<'_>) -> Result<Box<dyn EngineHandle>, NetError> {
        let task = tokio::spawn(std::future::pending::<()>());
        Ok(Box::new(TaskHandle(task)))
    }
}

pub struct TaskHandle(JoinHandle<()>);

impl EngineHandle for TaskHandle {
    fn terminate(&mut self) {
        self.0.abort();
    }
}

/// Build a client against `base_url` and return the engine side with it.
pub async fn connect(base_url: &str) -> (Client, EngineSide) {
    let (launcher, rx) = LoopbackEngine::new();
    let client = Client::builder(base_url)
        .launcher(launcher)
        .accept_timeout(Duration::from_secs(5))
        .build()
        .await
        .unwrap();
    let engine = rx.await.unwrap();
    (client, engine)
}

impl EngineSide {
    pub async fn next_request(&mut self) -> OutboundMessage {
        let payload = self.reader.read_frame().await.unwrap();
        OutboundMessage::decode(&payload).unwrap()
    }

    pub async fn reply(&mut self, label: &str, status: u16, raw: &str) {
        self.send(InboundMessage {
            label: label.to_string(),
            status,
            id: 0,
            time: 12.0,
            response: Some(ResponseBlob::encode_base64(raw.as_bytes())),
            error: None,
        })
        .await;
    }

    /// Send an arbitrary JSON payload, well-formed message or not.
    pub async fn send_json(&mut self, value: serde_json::Value) {
        let payload = serde_json::to_vec(&value).unwrap();
        self.writer.send(encode_frame(&payload).unwrap()).await.unwrap();
    }

    pub async fn send(&mut self, message: InboundMessage) {
        let frame = message.to_frame().unwrap();
        self.writer.send(frame).await.unwrap();
    }
}

/// Minimal raw exchange with `body` and an accurate content-length.
pub fn ok_exchange(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}
