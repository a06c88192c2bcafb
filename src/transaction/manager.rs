//! 资源管理器
//!
//! 协调单一资源上的本地事务：校验每一步协议操作的合法性，
//! 通过 `TransactionalResource` 钩子委托具体的资源操作。
//!
//! 提交或回滚钩子返回致命错误（或 panic）时，管理器进入脏状态，
//! 之后所有事务操作都会被立即拒绝，直到人工恢复。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::transaction::context::TransactionContext;
use crate::transaction::resource::TransactionalResource;
use crate::transaction::shutdown::wait_for_transactions;
use crate::transaction::types::*;

/// 管理器级别的状态，只在持有写锁时修改
#[derive(Debug, Clone, Copy)]
struct ManagerState {
    mode: OperationMode,
    dirty: bool,
}

/// 资源管理器
pub struct ResourceManager<R: TransactionalResource> {
    /// 具体资源
    resource: Arc<R>,
    /// 配置
    config: RwLock<ResourceManagerConfig>,
    /// 运行模式与脏标志
    state: RwLock<ManagerState>,
    /// 启动与停止互斥
    lifecycle: Mutex<()>,
    /// 活跃事务表
    active_transactions: DashMap<TransactionId, Arc<TransactionContext<R>>>,
    /// 事务ID生成器
    id_generator: AtomicU64,
    /// 统计信息
    stats: TransactionStats,
}

/// 事务结束守卫
///
/// 无论提交、回滚成功、失败还是 panic，离开作用域时都会
/// 移除活跃事务、执行最终清理并通知等待者。
struct FinishGuard<'a, R: TransactionalResource> {
    manager: &'a ResourceManager<R>,
    context: &'a TransactionContext<R>,
}

impl<R: TransactionalResource> Drop for FinishGuard<'_, R> {
    fn drop(&mut self) {
        self.manager.finish_transaction(self.context);
    }
}

impl<R: TransactionalResource> ResourceManager<R> {
    /// 创建新的资源管理器，初始为停止状态
    pub fn new(resource: Arc<R>, config: ResourceManagerConfig) -> Self {
        Self {
            resource,
            config: RwLock::new(config),
            state: RwLock::new(ManagerState {
                mode: OperationMode::Stopped,
                dirty: false,
            }),
            lifecycle: Mutex::new(()),
            active_transactions: DashMap::new(),
            id_generator: AtomicU64::new(1),
            stats: TransactionStats::new(),
        }
    }

    /// 获取资源
    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    /// 启动资源管理器
    ///
    /// 依次调用资源的 `do_start` 和 `recover`。恢复失败时管理器仍会启动，
    /// 但处于脏状态。
    pub fn start(&self) -> TransactionResult<()> {
        let _lifecycle = self.lifecycle.lock();

        {
            let mut state = self.state.write();
            if state.mode != OperationMode::Stopped {
                return Err(TransactionError::IllegalOperationMode {
                    operation: "start",
                    mode: state.mode,
                });
            }
            state.mode = OperationMode::Starting;
        }

        log::info!("正在启动资源管理器");

        if let Err(e) = self.resource.do_start() {
            self.state.write().mode = OperationMode::Stopped;
            log::error!("资源管理器启动失败: {}", e);
            return Err(e.into());
        }

        self.state.write().mode = OperationMode::Recovering;
        if let Err(e) = self.resource.recover() {
            log::warn!("恢复未完成的事务失败: {}", e);
            self.state.write().dirty = true;
        }

        let dirty = {
            let mut state = self.state.write();
            state.mode = OperationMode::Started;
            state.dirty
        };

        if dirty {
            log::warn!("资源管理器已启动，但处于脏状态（未完成事务恢复失败）");
        } else {
            log::info!("资源管理器已启动");
        }

        Ok(())
    }

    /// 以 Normal 模式停止，等待默认超时的两倍
    pub fn stop(&self) -> TransactionResult<bool> {
        self.stop_with_mode(ShutdownMode::Normal)
    }

    /// 以指定模式停止，等待默认超时的两倍
    pub fn stop_with_mode(&self, mode: ShutdownMode) -> TransactionResult<bool> {
        let timeout = self
            .default_transaction_timeout()
            .saturating_mul(ResourceManagerConfig::SHUTDOWN_TIMEOUT_FACTOR);
        self.stop_with_timeout(mode, timeout)
    }

    /// 以指定模式和超时停止
    ///
    /// # Returns
    /// * `Ok(true)` - 已停止
    /// * `Ok(false)` - 超时前仍有活跃事务，管理器保持 Stopping 状态
    pub fn stop_with_timeout(&self, mode: ShutdownMode, timeout: Duration) -> TransactionResult<bool> {
        if mode == ShutdownMode::Rollback {
            return Err(TransactionError::UnsupportedShutdownMode(mode));
        }

        let _lifecycle = self.lifecycle.lock();

        {
            let mut state = self.state.write();
            match state.mode {
                OperationMode::Stopped => return Ok(true),
                OperationMode::Started | OperationMode::Stopping => {
                    state.mode = OperationMode::Stopping;
                }
                other => {
                    return Err(TransactionError::IllegalOperationMode {
                        operation: "stop",
                        mode: other,
                    })
                }
            }
        }

        log::info!("正在停止资源管理器，模式: {}，超时: {:?}", mode, timeout);

        let success = self.shutdown(mode, timeout) && self.mark_stopped(mode);

        if success {
            if let Err(e) = self.resource.do_stop() {
                log::warn!("资源停止钩子失败: {}", e);
            }
            log::info!("资源管理器已停止");
        } else {
            let expired = self
                .active_transactions
                .iter()
                .filter(|entry| entry.value().is_expired())
                .count();
            log::warn!(
                "资源管理器未能在 {:?} 内停止，仍有 {} 个活跃事务，其中 {} 个已超时",
                timeout,
                self.active_transactions.len(),
                expired
            );
        }

        Ok(success)
    }

    /// 持有写锁再次确认活跃事务表为空后进入 Stopped
    ///
    /// 正在开始的事务在持有读锁时登记，因此不会在确认之后混入。
    fn mark_stopped(&self, mode: ShutdownMode) -> bool {
        let mut state = self.state.write();
        if mode == ShutdownMode::Normal && !self.active_transactions.is_empty() {
            return false;
        }
        state.mode = OperationMode::Stopped;
        true
    }

    fn shutdown(&self, mode: ShutdownMode, timeout: Duration) -> bool {
        match mode {
            ShutdownMode::Kill => {
                if !self.active_transactions.is_empty() {
                    log::warn!("强制停止，放弃 {} 个活跃事务", self.active_transactions.len());
                }
                true
            }
            ShutdownMode::Normal => {
                // 快照后释放表，等待期间不阻塞事务的移除
                let snapshot: Vec<Arc<TransactionContext<R>>> = self
                    .active_transactions
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect();

                let completed = wait_for_transactions(&snapshot, timeout);
                completed && self.active_transactions.is_empty()
            }
            ShutdownMode::Rollback => false,
        }
    }

    /// 获取默认事务超时
    pub fn default_transaction_timeout(&self) -> Duration {
        self.config.read().default_timeout
    }

    /// 设置默认事务超时
    pub fn set_default_transaction_timeout(&self, timeout: Duration) {
        self.config.write().default_timeout = timeout;
    }

    /// 获取当前运行模式
    pub fn operation_mode(&self) -> OperationMode {
        self.state.read().mode
    }

    /// 检查是否处于脏状态
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// 创建事务上下文，尚未登记为活跃事务
    pub fn start_transaction(&self, session: R::Session) -> TransactionResult<Arc<TransactionContext<R>>> {
        let payload = self.resource.create_transaction_context(&session)?;
        let txn_id = self.id_generator.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(TransactionContext::new(
            txn_id,
            session,
            payload,
            self.default_transaction_timeout(),
        )))
    }

    /// 开始事务
    pub fn begin_transaction(&self, context: &Arc<TransactionContext<R>>) -> TransactionResult<()> {
        self.assure_started()?;
        let _operation = context.lock_operation();

        if context.status().is_some() {
            return Err(TransactionError::AlreadyBegun(context.id));
        }

        self.resource.do_begin(context)?;

        {
            // 钩子执行期间管理器可能已开始停止，登记前在读锁下重新校验
            let state = self.state.read();
            let checked = Self::check_started(*state);
            if let Err(e) = checked {
                drop(state);
                self.abandon_begin(context);
                return Err(e);
            }

            context.activate()?;
            self.active_transactions.insert(context.id, context.clone());
        }
        self.stats.increment_total();
        self.stats.increment_active();

        log::debug!("开始事务 {}", context);
        Ok(())
    }

    /// 撤销已执行 `do_begin` 但未能登记的事务
    fn abandon_begin(&self, context: &TransactionContext<R>) {
        log::warn!("{} 开始期间资源管理器已不再接受新事务，撤销该事务", context);
        if let Err(e) = self.invoke_completion_hook(context, "撤销开始", || self.resource.do_rollback(context)) {
            log::warn!("撤销 {} 失败: {}", context, e);
        }
    }

    /// 准备事务
    pub fn prepare_transaction(&self, context: &TransactionContext<R>) -> TransactionResult<PrepareVote> {
        self.assure_ready()?;
        let _operation = context.lock_operation();
        Self::assure_pending(context)?;

        if context.status() == Some(TransactionStatus::MarkedRollback) {
            return Err(TransactionError::MarkedForRollback(context.id));
        }

        context.transition_to(TransactionStatus::Preparing)?;
        let vote = self.resource.do_prepare(context)?;
        context.transition_to(TransactionStatus::Prepared)?;

        if vote == PrepareVote::ReadOnly {
            context.set_read_only(true);
        }

        log::debug!("准备事务 {}，投票: {:?}", context, vote);
        Ok(vote)
    }

    /// 提交事务
    ///
    /// 提交钩子返回可恢复错误时自动回滚，返回 `CommitOutcome::RolledBack`；
    /// 返回致命错误或 panic 时管理器进入脏状态，错误继续向上传播。
    pub fn commit_transaction(&self, context: &TransactionContext<R>) -> TransactionResult<CommitOutcome> {
        self.assure_ready()?;
        let _operation = context.lock_operation();
        Self::assure_pending(context)?;

        if context.status() == Some(TransactionStatus::MarkedRollback) {
            return Err(TransactionError::MarkedForRollback(context.id));
        }

        context.transition_to(TransactionStatus::Committing)?;
        let _finish = FinishGuard {
            manager: self,
            context,
        };

        match self.invoke_completion_hook(context, "提交", || self.resource.do_commit(context)) {
            Ok(()) => {
                context.transition_to(TransactionStatus::Committed)?;
                self.stats.increment_committed();
                log::debug!("提交事务 {}", context);
                Ok(CommitOutcome::Committed)
            }
            Err(HookError::Fatal(reason)) => Err(TransactionError::Fatal(reason)),
            Err(HookError::Recoverable(reason)) => {
                log::warn!("无法提交 {}，改为回滚: {}", context, reason);
                self.stats.increment_commit_fallback();

                context.transition_to(TransactionStatus::RollingBack)?;
                self.invoke_completion_hook(context, "回滚", || self.resource.do_rollback(context))
                    .map_err(Self::completion_error)?;
                context.transition_to(TransactionStatus::RolledBack)?;
                self.stats.increment_rolled_back();

                Ok(CommitOutcome::RolledBack)
            }
        }
    }

    /// 回滚事务
    pub fn rollback_transaction(&self, context: &TransactionContext<R>) -> TransactionResult<()> {
        self.assure_ready()?;
        let _operation = context.lock_operation();
        Self::assure_pending(context)?;

        context.transition_to(TransactionStatus::RollingBack)?;
        let _finish = FinishGuard {
            manager: self,
            context,
        };

        self.invoke_completion_hook(context, "回滚", || self.resource.do_rollback(context))
            .map_err(Self::completion_error)?;
        context.transition_to(TransactionStatus::RolledBack)?;
        self.stats.increment_rolled_back();

        log::debug!("回滚事务 {}", context);
        Ok(())
    }

    /// 标记事务只能回滚
    pub fn set_transaction_rollback_only(&self, context: &TransactionContext<R>) -> TransactionResult<()> {
        let _operation = context.lock_operation();
        Self::assure_pending(context)?;

        if context.status() == Some(TransactionStatus::MarkedRollback) {
            return Ok(());
        }

        context.transition_to(TransactionStatus::MarkedRollback)?;
        log::debug!("事务 {} 已标记为只能回滚", context.id);
        Ok(())
    }

    /// 获取活跃事务上下文
    pub fn get_context(&self, txn_id: TransactionId) -> Option<Arc<TransactionContext<R>>> {
        self.active_transactions
            .get(&txn_id)
            .map(|entry| entry.value().clone())
    }

    /// 检查事务是否仍在活跃事务表中
    pub fn is_transaction_active(&self, txn_id: TransactionId) -> bool {
        self.active_transactions.contains_key(&txn_id)
    }

    /// 获取活跃事务数
    pub fn active_transaction_count(&self) -> usize {
        self.active_transactions.len()
    }

    /// 获取活跃事务列表
    pub fn list_active_transactions(&self) -> Vec<TransactionInfo> {
        self.active_transactions
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    /// 获取统计信息
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// 要求管理器已启动且不处于脏状态
    fn assure_started(&self) -> TransactionResult<()> {
        Self::check_started(*self.state.read())
    }

    fn check_started(state: ManagerState) -> TransactionResult<()> {
        if state.dirty {
            return Err(TransactionError::Dirty);
        }
        if !state.mode.accepts_new_transactions() {
            return Err(TransactionError::NotStarted(state.mode));
        }
        Ok(())
    }

    /// 要求管理器处于 Started 或 Stopping 且不处于脏状态
    fn assure_ready(&self) -> TransactionResult<()> {
        let state = *self.state.read();
        if state.dirty {
            return Err(TransactionError::Dirty);
        }
        if !state.mode.accepts_pending_transactions() {
            return Err(TransactionError::NotReady(state.mode));
        }
        Ok(())
    }

    /// 要求事务已开始且未结束，调用方需持有操作锁
    fn assure_pending(context: &TransactionContext<R>) -> TransactionResult<()> {
        if context.is_finished() {
            return Err(TransactionError::AlreadyFinished(context.id));
        }
        if context.status().is_none() {
            return Err(TransactionError::NotBegun(context.id));
        }
        Ok(())
    }

    /// 调用提交或回滚钩子
    ///
    /// 致命错误与 panic 会使管理器进入脏状态；panic 在标记后继续展开。
    fn invoke_completion_hook<F>(&self, context: &TransactionContext<R>, phase: &str, hook: F) -> HookResult<()>
    where
        F: FnOnce() -> HookResult<()>,
    {
        match panic::catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(HookError::Fatal(reason))) => {
                self.set_dirty(context, phase, &reason);
                Err(HookError::Fatal(reason))
            }
            Ok(Err(recoverable)) => Err(recoverable),
            Err(payload) => {
                self.set_dirty(context, phase, &panic_message(payload.as_ref()));
                panic::resume_unwind(payload)
            }
        }
    }

    fn completion_error(error: HookError) -> TransactionError {
        match error {
            HookError::Fatal(reason) => TransactionError::Fatal(reason),
            recoverable => TransactionError::Resource(recoverable),
        }
    }

    fn set_dirty(&self, context: &TransactionContext<R>, phase: &str, reason: &str) {
        self.state.write().dirty = true;
        self.stats.increment_fatal();
        log::error!(
            "{}{}时发生致命错误，资源管理器进入脏状态，需要人工恢复: {}",
            context,
            phase,
            reason
        );
    }

    /// 事务结束的唯一清理点
    fn finish_transaction(&self, context: &TransactionContext<R>) {
        if self.active_transactions.remove(&context.id).is_some() {
            self.stats.decrement_active();
        }
        self.resource.final_cleanup(context);
        context.notify_finish();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
