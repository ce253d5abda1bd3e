//! tests/common/harness.rs
use ptt_lvar_bridge::broker::{Broker, SessionEndedCallback};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "ptt_lvar_bridge=debug,ptt_bridge=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .init();
    });
}

/// A broker standing in for the voice client.
#[derive(Default)]
pub struct TestBroker {
    messages: Mutex<Vec<String>>,
    ptt: Mutex<Vec<bool>>,
    session_ended: Mutex<Option<SessionEndedCallback>>,
}

impl TestBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn ptt(&self) -> Vec<bool> {
        self.ptt.lock().unwrap().clone()
    }

    pub fn has_session_ended_callback(&self) -> bool {
        self.session_ended.lock().unwrap().is_some()
    }

    /// Ends the voice session the way the host would.
    pub fn end_session(&self) {
        if let Some(callback) = self.session_ended.lock().unwrap().as_ref() {
            callback();
        }
    }
}

impl Broker for TestBroker {
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

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
