//! The background worker: connect with retry, wait for notifications, dispatch.
//!
//! The worker alternates between two states. While `Connecting` it attempts a
//! connection, sleeping a fixed interval between failures. While `Connected`
//! it blocks on the notification wait handle and drains the session whenever
//! the transport signals. Any error while connected releases the session and
//! starts over from `Connecting`; the link is never partially reused.
//!
//! Both suspension points race the lifecycle token, so cancellation wakes the
//! worker immediately and always wins over retry or reconnect.
//!
//! 后台工作者：带重试的连接、等待通知、分发。
//!
//! 工作者在两个状态之间交替。在 `Connecting` 状态下尝试连接，失败之间固定休眠一段时间。
//! 在 `Connected` 状态下阻塞在通知等待句柄上，并在传输层发出信号时取尽会话中的消息。
//! 连接期间的任何错误都会释放会话并从 `Connecting` 重新开始；链路从不被部分复用。
//!
//! 两个挂起点都与生命周期令牌竞争，因此取消会立即唤醒工作者，并且总是优先于重试或重连。

use super::{
    session::SessionGuard,
    state::{LinkState, StateReporter},
};
use crate::{
    broker::BrokerLog,
    config::Config,
    error::{Error, Result},
    transport::{
        Connector, DataDefinition, EventHandle, HostMessage, PTT_DEFINITION_ID, PTT_REQUEST_ID,
        Session, UpdateRequest, decode_bool, encode_bool,
    },
};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// How a connected period ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    Lost,
}

/// Outcome of draining the session's message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    Idle,
    HostQuit,
    Cancelled,
}

/// The single background worker of one lifecycle.
///
/// 单个生命周期的唯一后台工作者。
pub struct Worker<C: Connector> {
    connector: Arc<C>,
    config: Arc<Config>,
    log: BrokerLog,
    event: EventHandle,
    cancel: CancellationToken,
    state: StateReporter,
}

impl<C: Connector> Worker<C> {
    pub(crate) fn new(
        connector: Arc<C>,
        config: Arc<Config>,
        log: BrokerLog,
        event: EventHandle,
        cancel: CancellationToken,
        state: StateReporter,
    ) -> Self {
        Self {
            connector,
            config,
            log,
            event,
            cancel,
            state,
        }
    }

    /// Runs until the lifecycle token is cancelled. Never returns an error:
    /// every failure is logged and turned into a state transition.
    ///
    /// 运行直到生命周期令牌被取消。从不返回错误：所有失败都会被记录并转化为状态转换。
    pub async fn run(self) {
        let mut was_connected = false;
        loop {
            if was_connected {
                self.log.warn("Connection to simulator lost.");
            }
            self.set_state(LinkState::Connecting);

            let Some(session) = self.connect_with_retry().await else {
                break;
            };
            was_connected = true;
            self.set_state(LinkState::Connected);

            if self.serve(session).await == Exit::Cancelled || self.cancel.is_cancelled() {
                break;
            }
        }
        self.set_state(LinkState::Stopped);
        debug!("PTT worker exited");
    }

    fn set_state(&self, state: LinkState) {
        if self.state.publish(state) {
            trace!(%state, "Link state changed");
        }
    }

    /// Attempts to connect until it succeeds or the token is cancelled.
    /// Returns `None` on cancellation.
    async fn connect_with_retry(&self) -> Option<SessionGuard<C::Session>> {
        let retry_interval = self.config.connection.retry_interval;
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            attempt = attempt.saturating_add(1);
            self.log.info("Attempt connection to simulator...");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.open_session() => result,
            };

            match result {
                Ok(mut session) => {
                    // The connect may have raced a cancellation; do not keep the link.
                    if self.cancel.is_cancelled() {
                        session.release();
                        return None;
                    }
                    debug!(attempt, "Simulator connect succeeded");
                    self.log.info("Connected to simulator.");
                    return Some(session);
                }
                Err(e) => {
                    debug!(
                        attempt,
                        retry_in = ?retry_interval,
                        "Simulator connect retry"
                    );
                    self.log.warn(&format!("Connection attempt failed: {e}"));
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = sleep(retry_interval) => {}
            }
        }
    }

    async fn open_session(&self) -> Result<SessionGuard<C::Session>> {
        let session = self
            .connector
            .connect(&self.config.client_name, self.event.clone())
            .await?;
        let mut session = SessionGuard::new(session);
        if let Err(e) = self.subscribe(&mut session).await {
            session.release();
            return Err(e);
        }
        Ok(session)
    }

    /// Registers the PTT variable and asks for change-only updates.
    async fn subscribe(&self, session: &mut SessionGuard<C::Session>) -> Result<()> {
        let variable = &self.config.variable;
        let connection = &self.config.connection;

        let definition = DataDefinition {
            id: PTT_DEFINITION_ID,
            variable: variable.clone(),
        };
        session.register_change_notification(&definition).await?;
        session
            .request_updates_on_change(&UpdateRequest {
                request_id: PTT_REQUEST_ID,
                definition_id: PTT_DEFINITION_ID,
                period: connection.update_period,
                changed_only: connection.changed_only,
            })
            .await?;

        if connection.reset_on_connect {
            session
                .set_data(PTT_DEFINITION_ID, encode_bool(false, variable.data_type))
                .await?;
        }
        debug!(variable = %variable, "Subscribed to PTT variable");
        Ok(())
    }

    /// Waits for notifications until the session is lost or the token is
    /// cancelled. The session is released on every exit.
    async fn serve(&self, mut session: SessionGuard<C::Session>) -> Exit {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    session.release();
                    return Exit::Cancelled;
                }
                _ = self.event.notified() => {}
            }

            match self.drain(&mut session).await {
                Ok(Drained::Idle) => {}
                Ok(Drained::Cancelled) => {
                    session.release();
                    return Exit::Cancelled;
                }
                Ok(Drained::HostQuit) => {
                    self.log.info("Simulator closed the connection.");
                    session.release();
                    return Exit::Lost;
                }
                Err(e) => {
                    self.log.warn(&format!("Connection error: {e}"));
                    session.release();
                    return Exit::Lost;
                }
            }
        }
    }

    /// Receives every queued message. Wake-ups coalesce, so one signal may
    /// stand for several messages.
    async fn drain(&self, session: &mut SessionGuard<C::Session>) -> Result<Drained> {
        while let Some(message) = session.receive_next_message().await? {
            if self.cancel.is_cancelled() {
                return Ok(Drained::Cancelled);
            }
            match message {
                HostMessage::Open => debug!("Host acknowledged connection"),
                HostMessage::SimObjectData {
                    definition_id,
                    data,
                    ..
                } => {
                    if definition_id != PTT_DEFINITION_ID {
                        trace!(definition_id, "Ignoring data for unknown definition");
                        continue;
                    }
                    let pressed = decode_bool(&data, self.config.variable.data_type)?;
                    self.dispatch(pressed);
                }
                HostMessage::Quit => return Ok(Drained::HostQuit),
                HostMessage::Exception { code } => return Err(Error::HostException(code)),
            }
        }
        Ok(Drained::Idle)
    }

    fn dispatch(&self, pressed: bool) {
        self.log.info(&format!("Set PTT={pressed}"));
        self.log.broker().set_ptt(pressed);
    }
}

impl<C: Connector> std::fmt::Debug for Worker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("client_name", &self.config.client_name)
            .field("variable", &self.config.variable)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
