#![allow(dead_code)]

use async_trait::async_trait;
use controller_service::broadcast::{BroadcastError, Broadcaster};
use controller_service::ingest::{MessageSource, RawMessage, SourceError};
use controller_service::models::Measurement;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub const TOPIC: &str = "measurements";

pub fn payload(sensor_id: &str, value: f64) -> RawMessage {
    RawMessage::new(format!(
        r#"{{"SensorId":"{sensor_id}","Timestamp":"2024-05-01T12:00:00+02:00","Value":{value}}}"#
    ))
}

/// What the ingest loop did to a [`ScriptedSource`].
#[derive(Debug, Default)]
pub struct SourceLog {
    pub subscribes: Vec<(String, String)>,
    pub polls: usize,
    pub closed: bool,
}

/// In-memory broker that replays a fixed script of poll results.
///
/// Once the script is exhausted the source behaves like an idle topic: each
/// poll waits out its timeout and returns nothing, or, with
/// [`ScriptedSource::block_when_idle`], never returns at all.
pub struct ScriptedSource {
    steps: VecDeque<Result<Option<RawMessage>, SourceError>>,
    subscribe_failures: usize,
    block_when_idle: bool,
    log: Arc<Mutex<SourceLog>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Result<Option<RawMessage>, SourceError>>) -> Self {
        Self {
            steps: steps.into(),
            subscribe_failures: 0,
            block_when_idle: false,
            log: Arc::new(Mutex::new(SourceLog::default())),
        }
    }

    pub fn with_messages(messages: Vec<RawMessage>) -> Self {
        Self::new(messages.into_iter().map(|m| Ok(Some(m))).collect())
    }

    pub fn failing_subscribes(mut self, count: usize) -> Self {
        self.subscribe_failures = count;
        self
    }

    pub fn block_when_idle(mut self) -> Self {
        self.block_when_idle = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SourceLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn subscribe(&mut self, topic: &str, group_id: &str) -> Result<(), SourceError> {
        self.log
            .lock()
            .unwrap()
            .subscribes
            .push((topic.to_string(), group_id.to_string()));

        if self.subscribe_failures > 0 {
            self.subscribe_failures -= 1;
            return Err(SourceError::Transient("unknown topic or partition".into()));
        }
        Ok(())
    }

    async fn poll_next(&mut self, timeout: Duration) -> Result<Option<RawMessage>, SourceError> {
        self.log.lock().unwrap().polls += 1;

        match self.steps.pop_front() {
            Some(step) => step,
            None if self.block_when_idle => std::future::pending().await,
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Broadcaster that forwards accepted publishes to a channel.
pub struct RecordingBroadcaster {
    tx: UnboundedSender<(String, Measurement)>,
    fail_remaining: AtomicUsize,
    stall_remaining: AtomicUsize,
}

impl RecordingBroadcaster {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<(String, Measurement)>) {
        Self::failing_first(0)
    }

    /// Rejects the first `count` publishes.
    pub fn failing_first(count: usize) -> (Arc<Self>, UnboundedReceiver<(String, Measurement)>) {
        Self::build(count, 0)
    }

    /// The first `count` publishes never complete.
    pub fn stalling_first(count: usize) -> (Arc<Self>, UnboundedReceiver<(String, Measurement)>) {
        Self::build(0, count)
    }

    fn build(fail: usize, stall: usize) -> (Arc<Self>, UnboundedReceiver<(String, Measurement)>) {
        let (tx, rx) = unbounded_channel();
        let broadcaster = Arc::new(Self {
            tx,
            fail_remaining: AtomicUsize::new(fail),
            stall_remaining: AtomicUsize::new(stall),
        });
        (broadcaster, rx)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish(&self, event: &str, record: &Measurement) -> Result<(), BroadcastError> {
        if take_one(&self.stall_remaining) {
            std::future::pending::<()>().await;
        }
        if take_one(&self.fail_remaining) {
            return Err(BroadcastError::Closed);
        }

        self.tx
            .send((event.to_string(), record.clone()))
            .map_err(|_| BroadcastError::Closed)
    }
}

/// Broadcaster whose publish never completes.
pub struct StalledBroadcaster;

#[async_trait]
impl Broadcaster for StalledBroadcaster {
    async fn publish(&self, _event: &str, _record: &Measurement) -> Result<(), BroadcastError> {
        std::future::pending().await
    }
}

pub async fn next_published(
    rx: &mut UnboundedReceiver<(String, Measurement)>,
) -> (String, Measurement) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a publish")
        .expect("broadcaster dropped")
}
