//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the PTT bridge.
/// PTT 桥接的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// The host could not be reached, or refused the connection.
    /// 无法连接到主机，或主机拒绝连接。
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The session was used after it had been closed.
    /// 会话在关闭后被使用。
    #[error("Session is closed")]
    SessionClosed,

    /// A data payload did not have the size the definition requires.
    /// 数据载荷的大小与定义要求不符。
    #[error("malformed data: expected {expected} bytes, got {actual}")]
    MalformedData { expected: usize, actual: usize },

    /// The host reported an exception for one of our requests.
    /// 主机针对我们的某个请求报告了异常。
    #[error("host exception {0}")]
    HostException(u32),

    /// Any other transport-level failure.
    /// 其他传输层故障。
    #[error("transport error: {0}")]
    Transport(String),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

