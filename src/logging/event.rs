//! Gateway events
//!
//! Every notable gateway action produces an [`Event`] with a stable numeric
//! id, so ground tools can filter on ids instead of message text. Events are
//! always logged through `tracing`; the reporter can additionally copy them to
//! an async channel and to the rotating event file.

use crate::constants::EVENT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::SyncSender;
use tokio::sync::mpsc;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Error,
}

/// Stable event identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventId {
    Init = 1,
    CmdPipeErr = 2,
    OutputEnabled = 3,
    SubscribeErr = 4,
    TlmPipeErr = 5,
    SocketErr = 6,
    OutputStopped = 7,
    MsgIdErr = 8,
    FnCodeErr = 9,
    AddPacketErr = 10,
    RemovePacketErr = 11,
    RemoveAllErr = 12,
    AddPacket = 15,
    RemovePacket = 16,
    RemoveAll = 17,
    Noop = 18,
    TableErr = 19,
    Reset = 20,
    EncodeErr = 21,
    LengthErr = 22,
    DestinationErr = 23,
    DataTypesErr = 24,
    HousekeepingErr = 25,
}

impl EventId {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// One gateway event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub severity: Severity,
    pub message: String,
    /// HH:MM:SS.mmm, local time
    pub timestamp: String,
}

impl Event {
    pub fn new(id: EventId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id,
            severity,
            message: message.into(),
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn info(id: EventId, message: impl Into<String>) -> Self {
        Self::new(id, Severity::Info, message)
    }

    pub fn error(id: EventId, message: impl Into<String>) -> Self {
        Self::new(id, Severity::Error, message)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        };
        write!(
            f,
            "{} [{}] ({}) {}",
            self.timestamp,
            level,
            self.id.code(),
            self.message
        )
    }
}

/// Fan-out point for gateway events
///
/// Cloning is cheap; every clone feeds the same sinks. Sinks never block the
/// caller: a full channel drops the event.
#[derive(Clone, Default)]
pub struct EventReporter {
    tx: Option<mpsc::Sender<Event>>,
    file: Option<SyncSender<Event>>,
}

impl EventReporter {
    /// Reporter that only logs through `tracing`
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter plus the receiving end of its event stream
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                tx: Some(tx),
                file: None,
            },
            rx,
        )
    }

    /// Also copy events to the event file writer
    pub fn with_file(mut self, file: SyncSender<Event>) -> Self {
        self.file = Some(file);
        self
    }

    pub fn send(&self, event: Event) {
        match event.severity {
            Severity::Debug => tracing::debug!(event_id = event.id.code(), "{}", event.message),
            Severity::Info => tracing::info!(event_id = event.id.code(), "{}", event.message),
            Severity::Error => tracing::error!(event_id = event.id.code(), "{}", event.message),
        }

        if let Some(file) = &self.file {
            let _ = file.try_send(event.clone());
        }
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }

    pub fn info(&self, id: EventId, message: impl Into<String>) {
        self.send(Event::info(id, message));
    }

    pub fn error(&self, id: EventId, message: impl Into<String>) {
        self.send(Event::error(id, message));
    }
}
