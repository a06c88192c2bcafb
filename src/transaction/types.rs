//! 事务协调类型定义
//!
//! 提供资源管理器所需的核心类型：事务状态、运行模式、关闭模式、
//! 错误类型、配置与统计信息

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 事务ID
pub type TransactionId = u64;

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// 活跃状态
    Active,
    /// 准备中（prepare 钩子执行中）
    Preparing,
    /// 已准备
    Prepared,
    /// 提交中
    Committing,
    /// 已提交
    Committed,
    /// 回滚中
    RollingBack,
    /// 已回滚
    RolledBack,
    /// 已标记为只能回滚
    MarkedRollback,
}

impl TransactionStatus {
    /// 检查是否已结束
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::RolledBack)
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;

        matches!(
            (self, next),
            (Active, Preparing)
                | (Preparing, Prepared)
                | (Prepared, Committing)
                | (Active, Committing)
                | (Committing, Committed)
                | (Committing, RollingBack)
                | (Active, RollingBack)
                | (Preparing, RollingBack)
                | (Prepared, RollingBack)
                | (MarkedRollback, RollingBack)
                | (RollingBack, RolledBack)
                | (Active, MarkedRollback)
                | (Preparing, MarkedRollback)
                | (Prepared, MarkedRollback)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "Active"),
            TransactionStatus::Preparing => write!(f, "Preparing"),
            TransactionStatus::Prepared => write!(f, "Prepared"),
            TransactionStatus::Committing => write!(f, "Committing"),
            TransactionStatus::Committed => write!(f, "Committed"),
            TransactionStatus::RollingBack => write!(f, "RollingBack"),
            TransactionStatus::RolledBack => write!(f, "RolledBack"),
            TransactionStatus::MarkedRollback => write!(f, "MarkedRollback"),
        }
    }
}

/// 资源管理器运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Stopped,
    Starting,
    Started,
    Stopping,
    Recovering,
}

impl OperationMode {
    /// 是否允许开始新事务
    pub fn accepts_new_transactions(&self) -> bool {
        matches!(self, OperationMode::Started)
    }

    /// 是否允许推进已有事务（准备、提交、回滚）
    pub fn accepts_pending_transactions(&self) -> bool {
        matches!(self, OperationMode::Started | OperationMode::Stopping)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Stopped => write!(f, "Stopped"),
            OperationMode::Starting => write!(f, "Starting"),
            OperationMode::Started => write!(f, "Started"),
            OperationMode::Stopping => write!(f, "Stopping"),
            OperationMode::Recovering => write!(f, "Recovering"),
        }
    }
}

/// 关闭模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutdownMode {
    /// 等待所有活跃事务结束（受超时限制）
    #[default]
    Normal,
    /// 关闭时回滚所有活跃事务（不支持）
    Rollback,
    /// 立即返回，放弃等待活跃事务
    Kill,
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownMode::Normal => write!(f, "Normal"),
            ShutdownMode::Rollback => write!(f, "Rollback"),
            ShutdownMode::Kill => write!(f, "Kill"),
        }
    }
}

/// 准备阶段投票
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareVote {
    /// 准备就绪，可以提交
    Ok,
    /// 事务未修改资源，提交为空操作
    ReadOnly,
}

impl PrepareVote {
    /// 投票码（与 XA 的 XA_OK / XA_RDONLY 取值一致）
    pub fn code(&self) -> i32 {
        match self {
            PrepareVote::Ok => 0,
            PrepareVote::ReadOnly => 3,
        }
    }
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// 提交成功
    Committed,
    /// 提交遇到可恢复错误，已自动回滚
    RolledBack,
}

/// 资源钩子错误
///
/// 区分可恢复错误与致命错误：致命错误会使资源管理器进入脏状态
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("可恢复的资源错误: {0}")]
    Recoverable(String),

    #[error("致命的资源错误: {0}")]
    Fatal(String),
}

impl HookError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookError::Fatal(_))
    }
}

pub type HookResult<T> = Result<T, HookError>;

/// 事务错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("资源管理器未启动，当前模式: {0}")]
    NotStarted(OperationMode),

    #[error("资源管理器未就绪，当前模式: {0}")]
    NotReady(OperationMode),

    #[error("资源管理器处于脏状态，需要人工恢复")]
    Dirty,

    #[error("无法在模式 {mode} 下执行 {operation}")]
    IllegalOperationMode {
        operation: &'static str,
        mode: OperationMode,
    },

    #[error("事务 {0} 已被标记为只能回滚")]
    MarkedForRollback(TransactionId),

    #[error("事务 {id} 无效的状态转换: 从 {from} 到 {to}")]
    InvalidStateTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("事务 {0} 尚未开始")]
    NotBegun(TransactionId),

    #[error("事务 {0} 已经开始")]
    AlreadyBegun(TransactionId),

    #[error("事务 {0} 已结束")]
    AlreadyFinished(TransactionId),

    #[error("资源操作失败: {0}")]
    Resource(#[from] HookError),

    #[error("致命错误，资源管理器已进入脏状态: {0}")]
    Fatal(String),

    #[error("不支持的关闭模式: {0}")]
    UnsupportedShutdownMode(ShutdownMode),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// 资源管理器配置
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceManagerConfig {
    /// 默认事务超时时间，关闭时默认等待其两倍
    pub default_timeout: Duration,
}

impl ResourceManagerConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
    /// 关闭等待时间相对默认超时的倍数
    pub const SHUTDOWN_TIMEOUT_FACTOR: u32 = 2;

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// 事务统计信息
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// 总事务数
    pub total_transactions: AtomicU64,
    /// 活跃事务数
    pub active_transactions: AtomicU64,
    /// 已提交事务数
    pub committed_transactions: AtomicU64,
    /// 已回滚事务数（含提交回退）
    pub rolled_back_transactions: AtomicU64,
    /// 提交失败后自动回滚的次数
    pub commit_fallbacks: AtomicU64,
    /// 致命错误次数
    pub fatal_failures: AtomicU64,
}

impl TransactionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total(&self) {
        self.total_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_active(&self) {
        self.active_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active(&self) {
        self.active_transactions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn increment_committed(&self) {
        self.committed_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rolled_back(&self) {
        self.rolled_back_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_fallback(&self) {
        self.commit_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fatal(&self) {
        self.fatal_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 事务信息（用于监控）
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub status: Option<TransactionStatus>,
    pub start_time: Instant,
    pub elapsed: Duration,
    pub timeout: Duration,
    /// 距超时的剩余时间，已超时为零
    pub remaining: Duration,
    pub is_expired: bool,
    pub is_read_only: bool,
}
