//! 事务上下文
//!
//! 管理单个事务的状态、完成标志与完成通知

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_utils::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::transaction::resource::TransactionalResource;
use crate::transaction::types::*;

/// 事务上下文
///
/// 由调用方持有 `Arc` 驱动事务，资源管理器在活跃事务表中持有另一份引用。
pub struct TransactionContext<R: TransactionalResource> {
    /// 事务ID
    pub id: TransactionId,
    /// 创建事务的会话
    owner: R::Session,
    /// 资源私有数据
    payload: R::Payload,
    /// 当前状态，开始之前为 None
    status: AtomicCell<Option<TransactionStatus>>,
    /// 操作锁，同一事务上的协议操作互斥
    operation_lock: Mutex<()>,
    /// 是否已结束
    finished: Mutex<bool>,
    /// 结束通知
    finish_signal: Condvar,
    /// 只读标志（由准备阶段投票设置）
    read_only: AtomicCell<bool>,
    /// 开始时间
    pub start_time: Instant,
    /// 超时时间
    timeout: Duration,
}

impl<R: TransactionalResource> TransactionContext<R> {
    pub(crate) fn new(
        id: TransactionId,
        owner: R::Session,
        payload: R::Payload,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            owner,
            payload,
            status: AtomicCell::new(None),
            operation_lock: Mutex::new(()),
            finished: Mutex::new(false),
            finish_signal: Condvar::new(),
            read_only: AtomicCell::new(false),
            start_time: Instant::now(),
            timeout,
        }
    }

    /// 获取当前状态
    pub fn status(&self) -> Option<TransactionStatus> {
        self.status.load()
    }

    pub fn owner(&self) -> &R::Session {
        &self.owner
    }

    pub fn payload(&self) -> &R::Payload {
        &self.payload
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load()
    }

    pub(crate) fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only);
    }

    /// 检查事务是否超时
    pub fn is_expired(&self) -> bool {
        self.start_time.elapsed() > self.timeout
    }

    /// 获取剩余时间
    pub fn remaining_time(&self) -> Duration {
        self.timeout.saturating_sub(self.start_time.elapsed())
    }

    /// 检查事务是否已结束
    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// 获取操作锁
    pub(crate) fn lock_operation(&self) -> MutexGuard<'_, ()> {
        self.operation_lock.lock()
    }

    /// 标记事务开始，调用方需持有操作锁
    pub(crate) fn activate(&self) -> TransactionResult<()> {
        if self.status.load().is_some() {
            return Err(TransactionError::AlreadyBegun(self.id));
        }
        self.status.store(Some(TransactionStatus::Active));
        Ok(())
    }

    /// 状态转换，调用方需持有操作锁
    pub(crate) fn transition_to(&self, next: TransactionStatus) -> TransactionResult<()> {
        let current = self.status.load().ok_or(TransactionError::NotBegun(self.id))?;

        if !current.can_transition_to(next) {
            return Err(TransactionError::InvalidStateTransition {
                id: self.id,
                from: current,
                to: next,
            });
        }

        self.status.store(Some(next));
        Ok(())
    }

    /// 标记事务结束并唤醒所有等待者，只生效一次
    pub(crate) fn notify_finish(&self) -> bool {
        let mut finished = self.finished.lock();
        if *finished {
            return false;
        }
        *finished = true;
        self.finish_signal.notify_all();
        true
    }

    /// 等待事务结束，直到截止时间
    ///
    /// # Returns
    /// * `true` - 事务已结束
    /// * `false` - 截止时间已到，事务仍未结束
    pub fn wait_for_finish(&self, deadline: Instant) -> bool {
        let mut finished = self.finished.lock();
        // 被唤醒后重新检查，防止伪唤醒
        while !*finished {
            if self.finish_signal.wait_until(&mut finished, deadline).timed_out() {
                return *finished;
            }
        }
        true
    }

    /// 无期限等待事务结束
    pub fn wait_until_finished(&self) {
        let mut finished = self.finished.lock();
        while !*finished {
            self.finish_signal.wait(&mut finished);
        }
    }

    /// 获取事务信息
    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id,
            status: self.status.load(),
            start_time: self.start_time,
            elapsed: self.start_time.elapsed(),
            timeout: self.timeout,
            remaining: self.remaining_time(),
            is_expired: self.is_expired(),
            is_read_only: self.read_only.load(),
        }
    }
}

impl<R: TransactionalResource> fmt::Debug for TransactionContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("status", &self.status.load())
            .field("finished", &self.is_finished())
            .field("read_only", &self.read_only.load())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<R: TransactionalResource> fmt::Display for TransactionContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status.load() {
            Some(status) => write!(f, "txn#{} ({})", self.id, status),
            None => write!(f, "txn#{} (not begun)", self.id),
        }
    }
}
