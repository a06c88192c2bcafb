//! 事务资源钩子
//!
//! 定义具体资源（队列、存储、连接）需要实现的接口。
//! 资源管理器负责协议的合法性校验，资源只负责自身的数据操作。

use crate::transaction::context::TransactionContext;
use crate::transaction::types::{HookResult, PrepareVote};

/// 事务资源trait
///
/// 钩子返回 `HookError::Recoverable` 表示协议层面的失败（例如提交冲突），
/// 返回 `HookError::Fatal` 或发生 panic 表示资源已不可信，
/// 资源管理器会进入脏状态。
pub trait TransactionalResource: Send + Sync + Sized + 'static {
    /// 创建事务的会话
    type Session: Send + Sync;
    /// 每个事务的资源私有数据
    type Payload: Send + Sync;

    /// 为会话创建事务的资源私有数据
    fn create_transaction_context(&self, session: &Self::Session) -> HookResult<Self::Payload>;

    /// 开始事务
    fn do_begin(&self, context: &TransactionContext<Self>) -> HookResult<()>;

    /// 准备提交
    ///
    /// # Returns
    /// * `Ok(PrepareVote)` - 准备成功，附带投票
    /// * `Err(HookError)` - 准备失败，事务需要回滚
    fn do_prepare(&self, context: &TransactionContext<Self>) -> HookResult<PrepareVote>;

    /// 提交事务
    fn do_commit(&self, context: &TransactionContext<Self>) -> HookResult<()>;

    /// 回滚事务
    fn do_rollback(&self, context: &TransactionContext<Self>) -> HookResult<()>;

    /// 资源管理器启动时调用
    fn do_start(&self) -> HookResult<()> {
        Ok(())
    }

    /// 恢复上次未完成的事务，在 `do_start` 之后调用
    fn recover(&self) -> HookResult<()> {
        Ok(())
    }

    /// 资源管理器成功停止后调用
    fn do_stop(&self) -> HookResult<()> {
        Ok(())
    }

    /// 事务结束后的清理，无论提交、回滚还是失败都会调用
    fn final_cleanup(&self, _context: &TransactionContext<Self>) {}
}
