//! Connection driver task
//!
//! Owns the push transport: connects, applies topic operations requested by
//! the writer, decodes incoming frames and enqueues the resulting events.
//! It never touches engagement state. Lost connections are retried with
//! exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use engage_core::{EventTransport, Topic, TransportFrame, wire};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::engine::{Command, ConnectionSignal};
use crate::subscription::Backoff;

/// Requests from the writer to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    Subscribe(Vec<Topic>),
    Unsubscribe(Vec<Topic>),
    Shutdown,
}

/// Drives one transport through connect/reconnect cycles
pub(crate) struct ConnectionDriver {
    transport: Arc<dyn EventTransport>,
    writer: mpsc::WeakUnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    backoff: Backoff,
}

impl ConnectionDriver {
    pub(crate) fn new(
        transport: Arc<dyn EventTransport>,
        writer: mpsc::WeakUnboundedSender<Command>,
        commands: mpsc::UnboundedReceiver<DriverCommand>,
        backoff: Backoff,
    ) -> Self {
        Self {
            transport,
            writer,
            commands,
            backoff,
        }
    }

    /// Run until shutdown or until the writer goes away
    #[instrument(name = "connection_driver", skip_all)]
    pub(crate) async fn run(mut self) {
        loop {
            if !self.signal(ConnectionSignal::Connecting) {
                return;
            }

            let mut frames = match self.transport.connect().await {
                Ok(frames) => frames,
                Err(error) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        %error,
                        attempt = self.backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "connect failed"
                    );
                    if !self.signal(ConnectionSignal::ConnectFailed(error)) || !self.wait(delay).await {
                        return;
                    }
                    continue;
                }
            };

            self.backoff.reset();
            info!("transport connected");
            if !self.signal(ConnectionSignal::Connected) {
                return;
            }

            loop {
                tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => {
                            if !self.handle_frame(frame) {
                                return;
                            }
                        }
                        None => break,
                    },
                    command = self.commands.recv() => match command {
                        Some(DriverCommand::Subscribe(topics)) => self.subscribe(&topics).await,
                        Some(DriverCommand::Unsubscribe(topics)) => self.unsubscribe(&topics).await,
                        Some(DriverCommand::Shutdown) | None => return,
                    },
                }
            }

            info!("transport disconnected");
            if !self.signal(ConnectionSignal::Disconnected) {
                return;
            }
            let delay = self.backoff.next_delay();
            if !self.wait(delay).await {
                return;
            }
        }
    }

    /// Sleep before reconnecting; returns `false` on shutdown
    ///
    /// Topic operations arriving while disconnected are dropped: the writer
    /// resubscribes the full desired set on the next connect.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Shutdown) | None => return false,
                    Some(other) => debug!(?other, "topic operation dropped while disconnected"),
                },
            }
        }
    }

    async fn subscribe(&self, topics: &[Topic]) {
        for topic in topics {
            match self.transport.subscribe(topic).await {
                Ok(()) => debug!(%topic, "subscribed"),
                Err(error) => warn!(%topic, %error, "subscribe failed"),
            }
        }
    }

    async fn unsubscribe(&self, topics: &[Topic]) {
        for topic in topics {
            if let Err(error) = self.transport.unsubscribe(topic).await {
                debug!(%topic, %error, "unsubscribe failed");
            }
        }
    }

    /// Decode a frame and hand the event to the writer
    fn handle_frame(&self, frame: TransportFrame) -> bool {
        match wire::decode_frame(&frame) {
            Ok(Some(event)) => self.send(Command::Event(event)),
            Ok(None) => {
                debug!(topic = %frame.topic, event = %frame.event, "ignoring non-engagement frame");
                true
            }
            Err(error) => {
                warn!(topic = %frame.topic, %error, "dropping malformed frame");
                true
            }
        }
    }

    fn signal(&self, signal: ConnectionSignal) -> bool {
        self.send(Command::Connection(signal))
    }

    fn send(&self, command: Command) -> bool {
        match self.writer.upgrade() {
            Some(writer) => writer.send(command).is_ok(),
            None => false,
        }
    }
}
