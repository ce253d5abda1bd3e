//! Transport layer abstraction for the simulation host.
//!
//! The bridge only depends on the operations declared here: connecting,
//! registering a change notification, receiving the next message and closing.
//! IPC details and registration bookkeeping belong to the implementations.
//!
//! 模拟主机的传输层抽象。
//!
//! 桥接器只依赖此处声明的操作：连接、注册变化通知、接收下一条消息以及关闭。
//! IPC细节和注册记录由具体实现负责。

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use crate::{
    config::{DataType, SimVariable, UpdatePeriod},
    error::{Error, Result},
};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{fmt::Debug, sync::Arc};
use tokio::sync::Notify;

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryHost;

/// Definition id under which the PTT variable is registered.
/// PTT变量注册时使用的定义ID。
pub const PTT_DEFINITION_ID: u32 = 0;

/// Request id of the PTT change subscription.
/// PTT变化订阅的请求ID。
pub const PTT_REQUEST_ID: u32 = 0;

/// The notification wait handle.
///
/// The transport signals it whenever a message is ready; the worker waits on
/// it between reads. Wake-ups coalesce: several signals before a wait yield a
/// single wake-up, so the waiter must drain all queued messages.
///
/// 通知等待句柄。
///
/// 每当有消息就绪时传输层就会发出信号；工作者在两次读取之间等待它。
/// 唤醒会合并：等待前的多次信号只产生一次唤醒，因此等待方必须取尽所有排队消息。
#[derive(Debug, Clone, Default)]
pub struct EventHandle {
    notify: Arc<Notify>,
}

impl EventHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a message as ready, waking the waiter or storing a permit.
    /// 标记消息就绪，唤醒等待者或保存一个许可。
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Waits until the handle is signaled.
    /// 等待句柄被触发。
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// A variable registration sent to the host.
///
/// 发送给主机的变量注册。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDefinition {
    pub id: u32,
    pub variable: SimVariable,
}

/// A request for the host to push updates of a registered definition.
///
/// 请求主机推送某个已注册定义的更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub request_id: u32,
    pub definition_id: u32,
    pub period: UpdatePeriod,
    /// Only deliver values that differ from the last delivered one.
    /// 仅传送与上次不同的值。
    pub changed_only: bool,
}

/// A message received from the host.
///
/// 从主机接收的消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// The host acknowledged the connection.
    /// 主机确认了连接。
    Open,
    /// New data for a subscribed definition.
    /// 已订阅定义的新数据。
    SimObjectData {
        request_id: u32,
        definition_id: u32,
        data: Bytes,
    },
    /// The host is shutting down; the session is no longer usable.
    /// 主机正在关闭；会话不再可用。
    Quit,
    /// The host rejected one of our calls.
    /// 主机拒绝了我们的某个调用。
    Exception { code: u32 },
}

/// Opens sessions to the host.
///
/// 打开到主机的会话。
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Establishes a session. `event` is signaled by the session whenever a
    /// message becomes available. May fail transiently.
    ///
    /// 建立会话。每当有消息可用时，会话会触发 `event`。可能暂时失败。
    async fn connect(&self, client_name: &str, event: EventHandle) -> Result<Self::Session>;
}

/// An active link to the host.
///
/// 到主机的活动链路。
#[async_trait]
pub trait Session: Send + Debug + 'static {
    /// Registers a variable whose changes should be reported.
    /// 注册需要报告变化的变量。
    async fn register_change_notification(&mut self, definition: &DataDefinition) -> Result<()>;

    /// Asks the host to start pushing updates for a registered definition.
    /// 请求主机开始推送已注册定义的更新。
    async fn request_updates_on_change(&mut self, request: &UpdateRequest) -> Result<()>;

    /// Writes an encoded value to a registered definition.
    /// 向已注册定义写入编码后的值。
    async fn set_data(&mut self, definition_id: u32, data: Bytes) -> Result<()>;

    /// Returns the next queued message, or `None` when the queue is empty.
    /// 返回下一条排队消息，队列为空时返回 `None`。
    async fn receive_next_message(&mut self) -> Result<Option<HostMessage>>;

    /// Closes the session. Implementations may fail on an already broken link.
    /// 关闭会话。在已损坏的链路上实现可能会失败。
    fn close(&mut self) -> Result<()>;
}

/// Encodes a boolean the way the host stores it for `data_type`.
///
/// 按主机对 `data_type` 的存储方式编码布尔值。
pub fn encode_bool(value: bool, data_type: DataType) -> Bytes {
    match data_type {
        DataType::Int32 => {
            let mut buf = BytesMut::with_capacity(data_type.size());
            buf.put_i32_le(i32::from(value));
            buf.freeze()
        }
    }
}

/// Decodes a boolean; any non-zero value is `true`.
///
/// 解码布尔值；任何非零值都为 `true`。
pub fn decode_bool(data: &[u8], data_type: DataType) -> Result<bool> {
    let expected = data_type.size();
    if data.len() < expected {
        return Err(Error::MalformedData {
            expected,
            actual: data.len(),
        });
    }
    let mut buf = data;
    match data_type {
        DataType::Int32 => Ok(buf.get_i32_le() != 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nonzero_is_true() {
        assert!(decode_bool(&[1, 0, 0, 0], DataType::Int32).unwrap());
        assert!(decode_bool(&[0, 0, 0, 0x80], DataType::Int32).unwrap());
        assert!(!decode_bool(&[0, 0, 0, 0], DataType::Int32).unwrap());
    }

    #[test]
    fn test_decode_short_payload_is_malformed() {
        let err = decode_bool(&[1, 0], DataType::Int32).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedData {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_encode_matches_host_layout() {
        assert_eq!(&encode_bool(true, DataType::Int32)[..], &[1, 0, 0, 0]);
        assert_eq!(&encode_bool(false, DataType::Int32)[..], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_event_handle_keeps_one_permit() {
        let event = EventHandle::new();
        event.signal();
        event.signal();
        // The stored permit satisfies exactly one wait.
        tokio::time::timeout(std::time::Duration::from_millis(50), event.notified())
            .await
            .expect("first wait should complete");
        let second =
            tokio::time::timeout(std::time::Duration::from_millis(50), event.notified()).await;
        assert!(second.is_err());
    }
}
