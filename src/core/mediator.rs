//! The Start/Stop controller of the connection lifecycle.
//!
//! Each effective `start` creates a fresh lifecycle token and spawns one
//! worker on a dedicated thread driving its own current-thread runtime.
//! `stop` cancels the token and joins that thread, so it can be called from
//! any thread, inside or outside a tokio runtime, and no broker call happens
//! after it returns.
//!
//! 连接生命周期的启动/停止控制器。
//!
//! 每次有效的 `start` 都会创建新的生命周期令牌，并在专用线程上生成一个工作者，
//! 该线程驱动自己的单线程运行时。`stop` 取消令牌并等待该线程结束，
//! 因此可以从任意线程调用，且返回后不会再有代理调用。

use super::{
    state::{LinkState, StateReporter},
    worker::Worker,
};
use crate::{
    broker::{Broker, BrokerLog},
    config::Config,
    transport::{Connector, EventHandle},
};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};
use tokio::{runtime, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// The token and worker of one Start/Stop cycle.
struct Lifecycle {
    token: CancellationToken,
    worker: JoinHandle<()>,
}

struct MediatorInner<C: Connector> {
    connector: Arc<C>,
    config: Arc<Config>,
    log: BrokerLog,
    /// Reused by every lifecycle and every session.
    event: EventHandle,
    /// Guards the check-and-set of the active lifecycle.
    lifecycle: Mutex<Option<Lifecycle>>,
    state_tx: Arc<watch::Sender<LinkState>>,
    /// Generation of the most recently started lifecycle.
    generation: Arc<AtomicU64>,
}

/// Forwards PTT changes of the simulator variable to a broker.
///
/// Cloning yields another handle to the same lifecycle.
///
/// 将模拟器变量的PTT变化转发给代理。克隆会得到同一生命周期的另一个句柄。
pub struct PttMediator<C: Connector> {
    inner: Arc<MediatorInner<C>>,
}

impl<C: Connector> Clone for PttMediator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> PttMediator<C> {
    pub fn new(connector: C, broker: Arc<dyn Broker>) -> Self {
        Self::with_config(connector, broker, Config::default())
    }

    pub fn with_config(connector: C, broker: Arc<dyn Broker>, config: Config) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Stopped);
        Self {
            inner: Arc::new(MediatorInner {
                connector: Arc::new(connector),
                config: Arc::new(config),
                log: BrokerLog::new(broker),
                event: EventHandle::new(),
                lifecycle: Mutex::new(None),
                state_tx: Arc::new(state_tx),
                generation: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// A handle that does not keep the mediator alive.
    ///
    /// 不会使中介器保持存活的句柄。
    pub fn downgrade(&self) -> WeakPttMediator<C> {
        WeakPttMediator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Option<Lifecycle>> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker unless one is already running. Returns immediately.
    ///
    /// No broker call is made while the lifecycle lock is held, so a broker
    /// may call back into `start` or `stop` from any of its methods.
    ///
    /// 启动工作者（除非已有一个在运行）。立即返回。
    /// 持有生命周期锁时不会调用代理，因此代理可以在任何方法中回调 `start` 或 `stop`。
    pub fn start(&self) {
        let failure = {
            let mut slot = self.lock_lifecycle();
            match slot.take() {
                Some(active) if !active.worker.is_finished() => {
                    *slot = Some(active);
                    debug!("PTT bridge already running");
                    return;
                }
                Some(dead) => {
                    // The worker can only finish on its own by panicking.
                    if dead.worker.join().is_err() {
                        error!("Previous PTT worker panicked; starting a new one");
                    }
                }
                None => {}
            }
            match self.spawn_lifecycle() {
                Ok(lifecycle) => {
                    *slot = Some(lifecycle);
                    None
                }
                Err(message) => Some(message),
            }
        };

        if let Some(message) = failure {
            self.inner.log.warn(&message);
        }
    }

    /// Creates a token and a worker thread for a new lifecycle. The thread
    /// announces the start itself, outside the lifecycle lock.
    fn spawn_lifecycle(&self) -> Result<Lifecycle, String> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to build worker runtime: {e}"))?;

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        let log = self.inner.log.clone();
        let worker = Worker::new(
            Arc::clone(&self.inner.connector),
            Arc::clone(&self.inner.config),
            log.clone(),
            self.inner.event.clone(),
            token.clone(),
            StateReporter::new(
                Arc::clone(&self.inner.state_tx),
                Arc::clone(&self.inner.generation),
                generation,
            ),
        );

        let spawned = thread::Builder::new()
            .name(self.inner.config.worker_thread_name.clone())
            .spawn(move || {
                log.info("Starting PTT bridge");
                runtime.block_on(worker.run());
            });
        match spawned {
            Ok(worker) => {
                debug!(generation, "Spawned PTT worker");
                Ok(Lifecycle { token, worker })
            }
            Err(e) => {
                // This generation is current but has no worker to report for it.
                self.inner.state_tx.send_replace(LinkState::Stopped);
                Err(format!("Failed to spawn worker thread: {e}"))
            }
        }
    }

    /// Stops the worker and blocks until it has exited. Does nothing if no
    /// worker is running.
    ///
    /// 停止工作者并阻塞直到其退出。没有工作者运行时不做任何事。
    pub fn stop(&self) {
        let Some(lifecycle) = self.lock_lifecycle().take() else {
            return;
        };

        self.inner.log.info("Stopping PTT bridge");
        lifecycle.token.cancel();

        if lifecycle.worker.thread().id() == thread::current().id() {
            // Called from a broker callback on the worker itself; it will exit
            // once the callback returns.
            warn!("PTT bridge stopped from its own worker thread; not joining");
            return;
        }
        if lifecycle.worker.join().is_err() {
            error!("PTT worker panicked");
        }
    }

    /// Whether a live worker exists.
    ///
    /// 是否存在存活的工作者。
    pub fn is_running(&self) -> bool {
        self.lock_lifecycle()
            .as_ref()
            .is_some_and(|lifecycle| !lifecycle.worker.is_finished())
    }

    /// The current link state.
    pub fn state(&self) -> LinkState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribes to link state changes.
    ///
    /// 订阅链路状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.inner.state_tx.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

/// A non-owning [`PttMediator`] handle, for callbacks held by the broker.
///
/// The broker owns the session-end callback and the mediator owns the broker,
/// so the callback must not own the mediator.
///
/// 非拥有的 [`PttMediator`] 句柄，用于代理持有的回调。
pub struct WeakPttMediator<C: Connector> {
    inner: Weak<MediatorInner<C>>,
}

impl<C: Connector> WeakPttMediator<C> {
    pub fn upgrade(&self) -> Option<PttMediator<C>> {
        self.inner.upgrade().map(|inner| PttMediator { inner })
    }
}

impl<C: Connector> Clone for WeakPttMediator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for PttMediator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PttMediator")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
