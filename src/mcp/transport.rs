//! Outbound half of the duplex channel
//!
//! Every message the server emits (responses and notifications) goes through a
//! [`MessageSink`]. [`LineSink`] frames each message as one line of JSON and holds
//! its lock across the whole write, so two messages never interleave.

use async_trait::async_trait;
use serde_json::Value;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::errors::TransportError;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &Value) -> Result<(), TransportError>;
}

pub struct LineSink<W> {
    writer: Mutex<W>,
}

impl<W> LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> MessageSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
