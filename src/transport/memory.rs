//! An in-process simulated host.
//!
//! `MemoryHost` implements [`Connector`] without any IPC. It can be scripted
//! to refuse connections, publish variable values, inject failures and shut
//! down, and it records what the bridge did to it. It is compiled for the
//! crate's own tests and, behind the `testing` feature, for downstream tests.
//!
//! 进程内的模拟主机。
//!
//! `MemoryHost` 在没有任何IPC的情况下实现 [`Connector`]。它可以被编排为拒绝连接、
//! 发布变量值、注入故障以及关闭，并记录桥接器对它执行的操作。
//! 仅在本crate的测试中以及启用 `testing` 特性时编译。

use super::{
    Connector, DataDefinition, EventHandle, HostMessage, Session, UpdateRequest, decode_bool,
    encode_bool,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::time::Instant;
use tracing::debug;

/// The link currently open between the host and a client.
#[derive(Debug)]
struct Link {
    id: u64,
    event: EventHandle,
    queue: VecDeque<Result<HostMessage>>,
    definition: Option<DataDefinition>,
    request: Option<UpdateRequest>,
}

impl Link {
    fn push(&mut self, message: Result<HostMessage>) {
        self.queue.push_back(message);
        self.event.signal();
    }
}

#[derive(Debug, Default)]
struct HostState {
    failures_left: usize,
    fail_next_close: bool,
    attempts: Vec<Instant>,
    client_names: Vec<String>,
    sessions_opened: usize,
    closes: usize,
    next_link_id: u64,
    link: Option<Link>,
    registrations: Vec<DataDefinition>,
    requests: Vec<UpdateRequest>,
    writes: Vec<(u32, Bytes)>,
}

impl HostState {
    fn link_mut(&mut self, id: u64) -> Result<&mut Link> {
        self.link
            .as_mut()
            .filter(|link| link.id == id)
            .ok_or(Error::SessionClosed)
    }

    /// The current link, if the client has subscribed to updates on it.
    fn subscribed_link(&mut self) -> Option<&mut Link> {
        self.link.as_mut().filter(|link| link.request.is_some())
    }
}

/// A simulated simulation host.
///
/// Cloning yields another handle to the same host.
///
/// 模拟的模拟主机。克隆会得到同一主机的另一个句柄。
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuses the next `count` connection attempts.
    /// 拒绝接下来的 `count` 次连接尝试。
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failures_left = count;
    }

    /// Makes the next `close` call report a failure (after closing).
    /// 使下一次 `close` 调用（在关闭之后）报告失败。
    pub fn fail_next_close(&self) {
        self.lock().fail_next_close = true;
    }

    /// Publishes a new value of the subscribed variable.
    ///
    /// Returns `false` when no client is subscribed, in which case the value
    /// is lost, as it would be on a real host.
    ///
    /// 发布已订阅变量的新值。没有客户端订阅时返回 `false`，该值会丢失。
    pub fn publish(&self, value: bool) -> bool {
        let mut state = self.lock();
        let Some(link) = state.subscribed_link() else {
            return false;
        };
        let (Some(request), Some(definition)) = (link.request, link.definition.as_ref()) else {
            return false;
        };
        let data = encode_bool(value, definition.variable.data_type);
        link.push(Ok(HostMessage::SimObjectData {
            request_id: request.request_id,
            definition_id: request.definition_id,
            data,
        }));
        true
    }

    /// Queues an arbitrary message on the current link.
    /// 在当前链路上排队任意消息。
    pub fn push_message(&self, message: HostMessage) -> bool {
        match self.lock().link.as_mut() {
            Some(link) => {
                link.push(Ok(message));
                true
            }
            None => false,
        }
    }

    /// Makes the next read on the current link fail with `error`.
    /// 使当前链路上的下一次读取以 `error` 失败。
    pub fn inject_error(&self, error: Error) -> bool {
        match self.lock().link.as_mut() {
            Some(link) => {
                link.push(Err(error));
                true
            }
            None => false,
        }
    }

    /// Announces a deliberate host shutdown on the current link.
    /// 在当前链路上宣告主机主动关闭。
    pub fn quit(&self) -> bool {
        self.push_message(HostMessage::Quit)
    }

    /// Drops the current link without notice, as a crashing host would.
    /// 不经通知地丢弃当前链路，如同主机崩溃。
    pub fn crash(&self) -> bool {
        match self.lock().link.take() {
            Some(link) => {
                link.event.signal();
                true
            }
            None => false,
        }
    }

    /// Whether a client is connected and subscribed.
    /// 是否有客户端已连接并订阅。
    pub fn is_subscribed(&self) -> bool {
        self.lock().subscribed_link().is_some()
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Instants at which each connection attempt was made.
    /// 每次连接尝试的时刻。
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.clone()
    }

    pub fn client_names(&self) -> Vec<String> {
        self.lock().client_names.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn registrations(&self) -> Vec<DataDefinition> {
        self.lock().registrations.clone()
    }

    pub fn update_requests(&self) -> Vec<UpdateRequest> {
        self.lock().requests.clone()
    }

    /// Values written by clients, decoded against their definition.
    /// 客户端写入的值，按其定义解码。
    pub fn written_values(&self) -> Vec<bool> {
        let state = self.lock();
        state
            .writes
            .iter()
            .filter_map(|(definition_id, data)| {
                let definition = state
                    .registrations
                    .iter()
                    .rev()
                    .find(|d| d.id == *definition_id)?;
                decode_bool(data, definition.variable.data_type).ok()
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MemoryHost {
    type Session = MemorySession;

    async fn connect(&self, client_name: &str, event: EventHandle) -> Result<Self::Session> {
        let mut state = self.lock();
        state.attempts.push(Instant::now());
        state.client_names.push(client_name.to_string());
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(Error::ConnectFailed("simulator is not running".to_string()));
        }

        let id = state.next_link_id;
        state.next_link_id += 1;
        state.sessions_opened += 1;
        let mut link = Link {
            id,
            event,
            queue: VecDeque::new(),
            definition: None,
            request: None,
        };
        link.push(Ok(HostMessage::Open));
        // A newer client replaces any previous link.
        state.link = Some(link);
        debug!(link = id, client = client_name, "MemoryHost accepted connection");

        Ok(MemorySession {
            host: Arc::clone(&self.state),
            link_id: id,
            closed: false,
        })
    }
}

/// A client's view of a [`MemoryHost`] link.
///
/// 客户端视角的 [`MemoryHost`] 链路。
#[derive(Debug)]
pub struct MemorySession {
    host: Arc<Mutex<HostState>>,
    link_id: u64,
    closed: bool,
}

impl MemorySession {
    fn lock(&self) -> Result<MutexGuard<'_, HostState>> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(self.host.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn register_change_notification(&mut self, definition: &DataDefinition) -> Result<()> {
        let mut state = self.lock()?;
        state.link_mut(self.link_id)?.definition = Some(definition.clone());
        state.registrations.push(definition.clone());
        Ok(())
    }

    async fn request_updates_on_change(&mut self, request: &UpdateRequest) -> Result<()> {
        let mut state = self.lock()?;
        let link = state.link_mut(self.link_id)?;
        match &link.definition {
            Some(definition) if definition.id == request.definition_id => {}
            _ => return Err(Error::HostException(request.definition_id)),
        }
        link.request = Some(*request);
        state.requests.push(*request);
        Ok(())
    }

    async fn set_data(&mut self, definition_id: u32, data: Bytes) -> Result<()> {
        let mut state = self.lock()?;
        state.link_mut(self.link_id)?;
        state.writes.push((definition_id, data));
        Ok(())
    }

    async fn receive_next_message(&mut self) -> Result<Option<HostMessage>> {
        let mut state = self.lock()?;
        let link = state.link_mut(self.link_id)?;
        link.queue.pop_front().transpose()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.closed = true;
        let mut state = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        if state.link.as_ref().is_some_and(|link| link.id == self.link_id) {
            state.link = None;
        }
        state.closes += 1;
        if std::mem::take(&mut state.fail_next_close) {
            return Err(Error::Transport("close on broken pipe".to_string()));
        }
        Ok(())
    }
}
