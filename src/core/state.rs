//! Defines the link state published by the worker.
//!
//! 定义工作者发布的链路状态。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::watch;

/// The state of the link to the simulation host.
/// 到模拟主机的链路状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No worker is running.
    /// 没有工作者在运行。
    Stopped,

    /// Disconnected, attempting to connect.
    /// 已断开，正在尝试连接。
    Connecting,

    /// Connected and subscribed, waiting for data.
    /// 已连接并订阅，正在等待数据。
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "Stopped",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// Publishes link state on behalf of one lifecycle.
///
/// Every lifecycle gets a generation number. A worker only writes while its
/// generation is the current one, so a cancelled worker that is still
/// finishing cannot overwrite the state of the worker that replaced it.
///
/// 代表单个生命周期发布链路状态。每个生命周期都有一个代号；工作者只有在其代号仍为当前代号时
/// 才会写入，因此仍在收尾的已取消工作者不会覆盖取代它的工作者的状态。
#[derive(Debug, Clone)]
pub(crate) struct StateReporter {
    tx: Arc<watch::Sender<LinkState>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl StateReporter {
    pub(crate) fn new(
        tx: Arc<watch::Sender<LinkState>>,
        current: Arc<AtomicU64>,
        generation: u64,
    ) -> Self {
        Self {
            tx,
            current,
            generation,
        }
    }

    /// Writes `state` if this lifecycle is still current. Returns whether it
    /// was written.
    pub(crate) fn publish(&self, state: LinkState) -> bool {
        let mut written = false;
        // The generation check runs under the channel's write lock.
        self.tx.send_if_modified(|value| {
            if self.current.load(Ordering::Acquire) != self.generation {
                return false;
            }
            written = true;
            let changed = *value != state;
            *value = state;
            changed
        });
        written
    }
}
