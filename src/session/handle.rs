use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::channel::ChannelEvent;
use crate::error::SessionError;
use crate::frame::FrameSample;

use super::SessionUpdate;

/// Inputs serialized into the session's single event queue.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(FrameSample),
    Channel(ChannelEvent),
    SwitchCamera,
    Stop,
}

/// Cloneable entry point for collaborators and observers.
///
/// Sending never blocks, so it is safe from tracker or socket callbacks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    events: mpsc::UnboundedSender<SessionEvent>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: Uuid,
        events: mpsc::UnboundedSender<SessionEvent>,
        updates: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            session_id,
            events,
            updates,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn frame(&self, sample: FrameSample) -> Result<(), SessionError> {
        self.send(SessionEvent::Frame(sample))
    }

    pub fn channel(&self, event: ChannelEvent) -> Result<(), SessionError> {
        self.send(SessionEvent::Channel(event))
    }

    pub fn switch_camera(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::SwitchCamera)
    }

    /// Requests a stop. A session that already ended ignores it.
    pub fn stop(&self) {
        let _ = self.events.send(SessionEvent::Stop);
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Updates as a stream; lagged items are skipped.
    pub fn updates(&self) -> impl Stream<Item = SessionUpdate> + Send + 'static {
        BroadcastStream::new(self.updates.subscribe()).filter_map(|item| item.ok())
    }

    pub(crate) fn publish(&self, update: SessionUpdate) {
        // 无订阅者时发送失败属于正常情况
        let _ = self.updates.send(update);
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .map_err(|_| SessionError::Terminated)
    }
}
