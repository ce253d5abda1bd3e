//! The host plugin shell.
//!
//! The voice client loads a plugin, hands it a broker, and later tells it the
//! session has ended. `PttPlugin` maps those two events onto the mediator's
//! `start` and `stop`.
//!
//! 主机插件外壳。语音客户端加载插件并交给它一个代理，之后通知它会话已结束。
//! `PttPlugin` 将这两个事件映射到中介器的 `start` 和 `stop`。

use crate::{
    broker::Broker,
    config::Config,
    core::mediator::PttMediator,
    transport::Connector,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// A plugin loadable by the voice client.
///
/// 可由语音客户端加载的插件。
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once by the host after loading the plugin.
    /// 主机加载插件后调用一次。
    fn initialize(&self, broker: Arc<dyn Broker>);
}

/// Plugin that bridges the simulator PTT variable to the broker.
///
/// 将模拟器PTT变量桥接到代理的插件。
pub struct PttPlugin<C: Connector> {
    name: String,
    config: Config,
    /// Consumed by the first `initialize`.
    connector: Mutex<Option<C>>,
    mediator: Mutex<Option<PttMediator<C>>>,
}

impl<C: Connector> PttPlugin<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, Config::default())
    }

    pub fn with_config(connector: C, config: Config) -> Self {
        Self {
            name: "Dcf-PTT".to_string(),
            config,
            connector: Mutex::new(Some(connector)),
            mediator: Mutex::new(None),
        }
    }

    /// The mediator created by `initialize`, if any.
    pub fn mediator(&self) -> Option<PttMediator<C>> {
        self.mediator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handles the end of the voice session by stopping the bridge.
    ///
    /// 通过停止桥接器来处理语音会话的结束。
    pub fn session_ended(&self) {
        if let Some(mediator) = self.mediator() {
            mediator.stop();
        }
    }
}

impl<C: Connector> Plugin for PttPlugin<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, broker: Arc<dyn Broker>) {
        let mediator = {
            let mut slot = self.mediator.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) => {
                    debug!(plugin = %self.name, "Plugin already initialized");
                    existing.clone()
                }
                None => {
                    let Some(connector) = self
                        .connector
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take()
                    else {
                        return;
                    };
                    let mediator =
                        PttMediator::with_config(connector, Arc::clone(&broker), self.config.clone());
                    let on_end = mediator.downgrade();
                    broker.on_session_ended(Box::new(move || {
                        if let Some(mediator) = on_end.upgrade() {
                            mediator.stop();
                        }
                    }));
                    *slot = Some(mediator.clone());
                    mediator
                }
            }
        };
        mediator.start();
    }
}
