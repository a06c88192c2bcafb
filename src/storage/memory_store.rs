//! 内存事务存储
//!
//! 一个最简单的事务资源：事务内的写操作先缓存在事务私有数据中，
//! 提交时一次性应用到共享数据，回滚时直接丢弃。

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::transaction::{HookResult, PrepareVote, TransactionContext, TransactionalResource};

/// 写操作日志条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
}

/// 事务内的缓冲写
#[derive(Debug, Default)]
pub struct StoreTransaction {
    writes: Mutex<Vec<WriteOp>>,
}

impl StoreTransaction {
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.writes.lock().push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&self, key: impl Into<String>) {
        self.writes.lock().push(WriteOp::Delete { key: key.into() });
    }

    /// 事务内可见的值：最近一次缓冲写优先
    pub fn pending(&self, key: &str) -> Option<Option<String>> {
        self.writes.lock().iter().rev().find_map(|op| match op {
            WriteOp::Put { key: k, value } if k == key => Some(Some(value.clone())),
            WriteOp::Delete { key: k } if k == key => Some(None),
            _ => None,
        })
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    fn take_writes(&self) -> Vec<WriteOp> {
        std::mem::take(&mut *self.writes.lock())
    }
}

/// 内存键值存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取已提交的值
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// 在事务内读取，先查缓冲写再查已提交数据
    pub fn get_in(&self, context: &TransactionContext<Self>, key: &str) -> Option<String> {
        match context.payload().pending(key) {
            Some(value) => value,
            None => self.get(key),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl TransactionalResource for MemoryStore {
    type Session = String;
    type Payload = StoreTransaction;

    fn create_transaction_context(&self, session: &String) -> HookResult<StoreTransaction> {
        log::trace!("为会话 {} 创建存储事务", session);
        Ok(StoreTransaction::default())
    }

    fn do_begin(&self, _context: &TransactionContext<Self>) -> HookResult<()> {
        Ok(())
    }

    fn do_prepare(&self, context: &TransactionContext<Self>) -> HookResult<PrepareVote> {
        if context.payload().write_count() == 0 {
            Ok(PrepareVote::ReadOnly)
        } else {
            Ok(PrepareVote::Ok)
        }
    }

    fn do_commit(&self, context: &TransactionContext<Self>) -> HookResult<()> {
        let writes = context.payload().take_writes();
        if writes.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        for op in writes {
            match op {
                WriteOp::Put { key, value } => {
                    data.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn do_rollback(&self, context: &TransactionContext<Self>) -> HookResult<()> {
        let discarded = context.payload().take_writes();
        log::trace!("{} 丢弃 {} 条缓冲写", context, discarded.len());
        Ok(())
    }

    fn final_cleanup(&self, context: &TransactionContext<Self>) {
        context.payload().take_writes();
    }
}
