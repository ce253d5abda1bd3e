//! Scoped ownership of a transport session with idempotent release.
//!
//! 传输会话的作用域所有权，支持幂等释放。

use crate::transport::Session;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Owns a [`Session`] and guarantees it is closed at most once.
///
/// `release` is called explicitly on every exit path of the worker; `Drop`
/// only catches paths where the owning future itself was dropped.
///
/// 拥有一个 [`Session`] 并保证它最多被关闭一次。
#[derive(Debug)]
pub struct SessionGuard<S: Session> {
    session: S,
    closed: bool,
}

impl<S: Session> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.closed
    }

    /// Closes the session unless it has already been closed.
    ///
    /// Close failures are discarded: tearing down a broken link may fail, and
    /// that must not keep the worker from reconnecting or exiting.
    ///
    /// 关闭会话（若尚未关闭）。关闭失败会被丢弃：拆除已损坏的链路可能会失败，
    /// 这不能阻止工作者重新连接或退出。
    pub fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.close() {
            debug!(error = %e, "Ignoring error while closing session");
        }
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}
