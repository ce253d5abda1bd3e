//! The connection lifecycle manager.
//! 连接生命周期管理器。

pub mod mediator;
pub mod session;
pub mod state;
pub mod worker;
