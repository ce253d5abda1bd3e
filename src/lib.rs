#![deny(clippy::expect_used, clippy::unwrap_used)]

//! Bridges a simulator push-to-talk variable to a voice client's broker.
//! 将模拟器的按键通话变量桥接到语音客户端的代理。

pub mod broker;
pub mod config;
pub mod error;
pub mod plugin;
pub mod transport;

pub mod core;

#[cfg(test)]
mod testing;

pub use broker::Broker;
pub use config::Config;
pub use crate::core::mediator::PttMediator;
pub use error::{Error, Result};
pub use plugin::{Plugin, PttPlugin};
