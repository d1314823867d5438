//! Event transport between the agent service and a session.

use async_trait::async_trait;
use tokio::sync::mpsc;

use quill_core::{ChatEvent, Result};

/// A connected stream of turn events.
///
/// `next_event` yields `None` when the transport closes; a close before a
/// terminal event is a transport failure and sessions treat it as one.
#[async_trait]
pub trait Transport: Send {
    /// Receive the next event, or None when the stream is closed.
    async fn next_event(&mut self) -> Option<Result<ChatEvent>>;
}

/// In-process transport over a bounded channel.
pub struct ChannelTransport {
    rx: mpsc::Receiver<Result<ChatEvent>>,
}

impl ChannelTransport {
    /// Create a connected sender/transport pair.
    pub fn pair(buffer: usize) -> (mpsc::Sender<Result<ChatEvent>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn next_event(&mut self) -> Option<Result<ChatEvent>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_delivers_in_order() {
        let (tx, mut transport) = ChannelTransport::pair(8);
        tx.send(Ok(ChatEvent::FinalStart)).await.unwrap();
        tx.send(Ok(ChatEvent::FinalDelta {
            delta: "hi".to_string(),
        }))
        .await
        .unwrap();
        drop(tx);

        assert_eq!(
            transport.next_event().await.unwrap().unwrap(),
            ChatEvent::FinalStart
        );
        assert_eq!(
            transport.next_event().await.unwrap().unwrap(),
            ChatEvent::FinalDelta {
                delta: "hi".to_string()
            }
        );
        assert!(transport.next_event().await.is_none());
    }
}
