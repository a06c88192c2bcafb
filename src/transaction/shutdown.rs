//! 关闭等待
//!
//! 在不持有管理器锁的情况下，按剩余时间预算依次等待活跃事务结束

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::transaction::context::TransactionContext;
use crate::transaction::resource::TransactionalResource;

/// 依次等待快照中的事务结束
///
/// 每个事务的等待时间为总超时减去已经过去的时间，预算耗尽时立即返回。
///
/// # Returns
/// * `true` - 快照中的事务都已结束
/// * `false` - 超时前仍有事务未结束
pub fn wait_for_transactions<R: TransactionalResource>(
    snapshot: &[Arc<TransactionContext<R>>],
    timeout: Duration,
) -> bool {
    let started = Instant::now();
    // 超时大到无法表示为截止时间时，视为无期限等待
    let deadline = started.checked_add(timeout);
    let mut all_finished = true;

    for context in snapshot {
        if started.elapsed() >= timeout {
            warn_unfinished(context, "关闭超时");
            return false;
        }

        log::debug!(
            "等待 {} 结束，剩余时间 {:?}",
            context,
            timeout.saturating_sub(started.elapsed())
        );

        match deadline {
            Some(deadline) => {
                if !context.wait_for_finish(deadline) {
                    warn_unfinished(context, "等待超时");
                    all_finished = false;
                }
            }
            None => context.wait_until_finished(),
        }
    }

    all_finished
}

fn warn_unfinished<R: TransactionalResource>(context: &TransactionContext<R>, reason: &str) {
    if context.is_expired() {
        log::warn!(
            "{}，{} 仍未结束，已超过事务超时 {:?}",
            reason,
            context,
            context.timeout()
        );
    } else {
        log::warn!(
            "{}，{} 仍未结束，距事务超时还有 {:?}",
            reason,
            context,
            context.remaining_time()
        );
    }
}
