//! The voice-client broker collaborator and the log channel built on it.
//!
//! 语音客户端代理协作者，以及基于它的日志通道。

use std::sync::Arc;
use tracing::{info, warn};

/// Callback invoked by the host when the voice session ends.
/// 语音会话结束时由主机调用的回调。
pub type SessionEndedCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// The voice-communication client, as seen from the bridge.
///
/// Implementations must be cheap and non-blocking: both calls happen on the
/// worker thread between transport reads.
///
/// 从桥接器角度看到的语音通信客户端。
///
/// 实现必须轻量且非阻塞：两个调用都在工作线程的传输读取之间发生。
pub trait Broker: Send + Sync + 'static {
    /// Posts a best-effort diagnostic line.
    /// 发送一条尽力而为的诊断信息。
    fn post_debug_message(&self, text: &str);

    /// Forwards the current push-to-talk state.
    /// 转发当前的按键通话状态。
    fn set_ptt(&self, pressed: bool);

    /// Registers a callback for the end of the voice session.
    ///
    /// The default implementation drops the callback, for brokers without a
    /// session concept.
    ///
    /// 注册语音会话结束时的回调。默认实现丢弃该回调。
    fn on_session_ended(&self, callback: SessionEndedCallback) {
        drop(callback);
    }
}

/// Log channel that mirrors every line to `tracing` and to the broker.
///
/// 将每一行同时写入 `tracing` 和代理的日志通道。
#[derive(Clone)]
pub(crate) struct BrokerLog {
    broker: Arc<dyn Broker>,
}

impl BrokerLog {
    pub(crate) fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub(crate) fn info(&self, message: &str) {
        info!(target: "ptt_bridge", "{message}");
        self.broker.post_debug_message(message);
    }

    pub(crate) fn warn(&self, message: &str) {
        warn!(target: "ptt_bridge", "{message}");
        self.broker.post_debug_message(message);
    }

    pub(crate) fn broker(&self) -> &dyn Broker {
        self.broker.as_ref()
    }
}

impl std::fmt::Debug for BrokerLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerLog").finish_non_exhaustive()
    }
}
