//! 集成测试共享工具模块
//!
//! 提供可编排的测试资源：记录钩子调用次数，并可按需注入故障或延迟

#![allow(dead_code)]

pub mod assertions;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use localtx::transaction::{
    HookError, HookResult, PrepareVote, ResourceManager, ResourceManagerConfig, TransactionContext,
    TransactionalResource,
};
use parking_lot::Mutex;

/// 注入的故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Recoverable,
    Fatal,
    Panic,
}

impl Fault {
    fn raise(self, phase: &str) -> HookResult<()> {
        match self {
            Fault::Recoverable => Err(HookError::Recoverable(format!("{} conflict", phase))),
            Fault::Fatal => Err(HookError::Fatal(format!("{} device failure", phase))),
            Fault::Panic => panic!("{} hook panicked", phase),
        }
    }
}

/// 可编排的测试资源
#[derive(Default)]
pub struct ScriptedResource {
    pub creates: AtomicUsize,
    pub begins: AtomicUsize,
    pub prepares: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub cleanups: AtomicUsize,
    commit_fault: Mutex<Option<Fault>>,
    rollback_fault: Mutex<Option<Fault>>,
    commit_delay: Mutex<Option<Duration>>,
    begin_gate: Mutex<Option<Arc<Barrier>>>,
}

impl ScriptedResource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_commit_with(&self, fault: Fault) {
        *self.commit_fault.lock() = Some(fault);
    }

    pub fn fail_rollback_with(&self, fault: Fault) {
        *self.rollback_fault.lock() = Some(fault);
    }

    pub fn delay_commit(&self, delay: Duration) {
        *self.commit_delay.lock() = Some(delay);
    }

    /// 让 `do_begin` 在栅栏上停两次：第一次表示已进入钩子，第二次等待放行
    pub fn gate_begin(&self, gate: Arc<Barrier>) {
        *self.begin_gate.lock() = Some(gate);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// 所有事务钩子的调用总数
    pub fn hook_calls(&self) -> usize {
        Self::count(&self.begins)
            + Self::count(&self.prepares)
            + Self::count(&self.commits)
            + Self::count(&self.rollbacks)
    }
}

impl TransactionalResource for ScriptedResource {
    type Session = String;
    type Payload = ();

    fn create_transaction_context(&self, _session: &String) -> HookResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn do_begin(&self, _context: &TransactionContext<Self>) -> HookResult<()> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let gate = self.begin_gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        Ok(())
    }

    fn do_prepare(&self, _context: &TransactionContext<Self>) -> HookResult<PrepareVote> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(PrepareVote::Ok)
    }

    fn do_commit(&self, _context: &TransactionContext<Self>) -> HookResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let delay = *self.commit_delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let fault = *self.commit_fault.lock();
        match fault {
            Some(fault) => fault.raise("commit"),
            None => Ok(()),
        }
    }

    fn do_rollback(&self, _context: &TransactionContext<Self>) -> HookResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        let fault = *self.rollback_fault.lock();
        match fault {
            Some(fault) => fault.raise("rollback"),
            None => Ok(()),
        }
    }

    fn final_cleanup(&self, _context: &TransactionContext<Self>) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// 创建并启动测试用资源管理器
pub fn started_manager() -> (Arc<ScriptedResource>, Arc<ResourceManager<ScriptedResource>>) {
    let resource = ScriptedResource::new();
    let manager = Arc::new(ResourceManager::new(
        resource.clone(),
        ResourceManagerConfig::default(),
    ));
    manager.start().expect("启动资源管理器失败");
    (resource, manager)
}

/// 创建并开始一个事务
pub fn begin(
    manager: &ResourceManager<ScriptedResource>,
    session: &str,
) -> Arc<TransactionContext<ScriptedResource>> {
    let ctx = manager
        .start_transaction(session.to_string())
        .expect("创建事务失败");
    manager.begin_transaction(&ctx).expect("开始事务失败");
    ctx
}
