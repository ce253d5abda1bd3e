//! 测试辅助工具模块
//! Test utilities module

use crate::{
    broker::{Broker, BrokerLog, SessionEndedCallback},
    config::Config,
    core::{
        state::{LinkState, StateReporter},
        worker::Worker,
    },
    transport::{EventHandle, MemoryHost},
};
use std::{
    sync::{Arc, Mutex, Once, atomic::AtomicU64},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "ptt_bridge=debug,ptt_lvar_bridge=debug".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Polls `condition` on the calling thread until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A broker that records every call it receives.
#[derive(Default)]
pub struct RecordingBroker {
    messages: Mutex<Vec<String>>,
    ptt: Mutex<Vec<bool>>,
    session_ended: Mutex<Option<SessionEndedCallback>>,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_messages(&self, prefix: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.starts_with(prefix))
            .count()
    }

    pub fn ptt(&self) -> Vec<bool> {
        self.ptt.lock().unwrap().clone()
    }

    /// Waits until at least `count` PTT calls were recorded.
    pub async fn wait_for_ptt(&self, count: usize) -> Vec<bool> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let ptt = self.ptt();
                if ptt.len() >= count {
                    return ptt;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for PTT calls")
    }

    /// Fires the registered session-ended callback, if any.
    pub fn end_session(&self) {
        if let Some(callback) = self.session_ended.lock().unwrap().as_ref() {
            callback();
        }
    }
}

impl Broker for RecordingBroker {
    fn post_debug_message(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }

    fn set_ptt(&self, pressed: bool) {
        self.ptt.lock().unwrap().push(pressed);
    }

    fn on_session_ended(&self, callback: SessionEndedCallback) {
        *self.session_ended.lock().unwrap() = Some(callback);
    }
}

/// A worker running on the test runtime against a `MemoryHost`.
pub struct WorkerHarness {
    pub host: MemoryHost,
    pub broker: Arc<RecordingBroker>,
    pub cancel: CancellationToken,
    pub state_rx: watch::Receiver<LinkState>,
    pub task: JoinHandle<()>,
}

impl WorkerHarness {
    /// Spawns a worker with the default config against `host`.
    pub fn spawn(host: MemoryHost) -> Self {
        Self::spawn_with_config(host, Config::default())
    }

    pub fn spawn_with_config(host: MemoryHost, config: Config) -> Self {
        init_tracing();
        let broker = RecordingBroker::new();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(LinkState::Stopped);
        let worker = Worker::new(
            Arc::new(host.clone()),
            Arc::new(config),
            BrokerLog::new(broker.clone()),
            EventHandle::new(),
            cancel.clone(),
            StateReporter::new(Arc::new(state_tx), Arc::new(AtomicU64::new(1)), 1),
        );
        let task = tokio::spawn(worker.run());
        Self {
            host,
            broker,
            cancel,
            state_rx,
            task,
        }
    }

    /// Waits until the worker reports `state`.
    pub async fn wait_for_state(&mut self, state: LinkState) {
        tokio::time::timeout(Duration::from_secs(30), self.state_rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for link state")
            .expect("worker dropped its state channel");
    }

    /// Waits until the host has seen `count` sessions and the latest one is subscribed.
    pub async fn wait_for_session(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.host.sessions_opened() < count || !self.host.is_subscribed() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for session");
    }

    /// Cancels the worker and waits for it to exit.
    pub async fn shutdown(self) -> (MemoryHost, Arc<RecordingBroker>) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), self.task)
            .await
            .expect("worker did not exit after cancellation")
            .expect("worker panicked");
        (self.host, self.broker)
    }
}
