//! 事务协调模块
//!
//! 提供单一资源上的本地事务协调功能，包括：
//! - 事务生命周期管理（开始、准备、提交、回滚）
//! - 致命错误隔离（脏状态）
//! - 带超时的平滑关闭
//! - 事务统计与监控
//!
//! ## 使用示例
//!
//! ```rust
//! use std::sync::Arc;
//! use localtx::storage::MemoryStore;
//! use localtx::transaction::{ResourceManager, ResourceManagerConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let manager = ResourceManager::new(store.clone(), ResourceManagerConfig::default());
//! manager.start().expect("启动失败");
//!
//! let ctx = manager.start_transaction("session-1".to_string()).expect("创建事务失败");
//! manager.begin_transaction(&ctx).expect("开始事务失败");
//! ctx.payload().put("key", "value");
//! manager.prepare_transaction(&ctx).expect("准备事务失败");
//! manager.commit_transaction(&ctx).expect("提交事务失败");
//!
//! assert_eq!(store.get("key"), Some("value".to_string()));
//! assert!(manager.stop().expect("停止失败"));
//! ```

pub mod context;
pub mod manager;
pub mod resource;
pub mod shutdown;
pub mod types;

pub use context::TransactionContext;
pub use manager::ResourceManager;
pub use resource::TransactionalResource;
pub use types::*;

use std::sync::Arc;

use crate::config::Config;
use crate::utils::logging::{self, LoggingError};

/// 创建默认配置的资源管理器
pub fn create_resource_manager<R: TransactionalResource>(resource: Arc<R>) -> ResourceManager<R> {
    ResourceManager::new(resource, ResourceManagerConfig::default())
}

/// 按配置文件创建资源管理器
///
/// 日志系统尚未初始化时按 `[log]` 段启动，随后记录生效的事务配置。
pub fn create_resource_manager_from_config<R: TransactionalResource>(
    resource: Arc<R>,
    config: &Config,
) -> Result<ResourceManager<R>, LoggingError> {
    logging::init(&config.log)?;

    let manager_config = ResourceManagerConfig::from(config);
    log::info!(
        "资源管理器配置: 默认事务超时 {:?}，默认关闭等待 {:?}",
        manager_config.default_timeout,
        manager_config
            .default_timeout
            .saturating_mul(ResourceManagerConfig::SHUTDOWN_TIMEOUT_FACTOR)
    );

    Ok(ResourceManager::new(resource, manager_config))
}
