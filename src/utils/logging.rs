// 日志工具模块
//
// 按 `[log]` 配置启动 flexi_logger，资源管理器的脏状态和关闭超时
// 等告警可以同时输出到 stderr

use crate::config::LogConfig;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
    WriteMode,
};
use parking_lot::Mutex;
use thiserror::Error;

/// 全局日志句柄，关闭时用于 flush 异步缓冲
static LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = Mutex::new(None);

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("无效的日志级别 {level:?}: {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: FlexiLoggerError,
    },
    #[error("日志系统启动失败: {0}")]
    Start(#[from] FlexiLoggerError),
}

/// 初始化日志系统
///
/// 已初始化时直接返回，不替换已有的句柄。
///
/// # Returns
/// * `Ok(true)` - 本次调用完成了初始化
/// * `Ok(false)` - 日志系统此前已初始化
pub fn init(config: &LogConfig) -> Result<bool, LoggingError> {
    let mut guard = LOGGER_HANDLE.lock();
    if guard.is_some() {
        return Ok(false);
    }

    let logger = Logger::try_with_str(&config.level).map_err(|source| LoggingError::InvalidLevel {
        level: config.level.clone(),
        source,
    })?;

    let duplicate = if config.warnings_to_stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };

    let handle = logger
        .log_to_file(
            FileSpec::default()
                .basename(&config.file)
                .directory(&config.dir),
        )
        .rotate(
            Criterion::Size(config.max_file_size),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::Async)
        .append()
        .start()?;

    *guard = Some(handle);

    log::info!("日志系统初始化完成: {}/{}", config.dir, config.file);
    Ok(true)
}

/// 刷新异步缓冲
pub fn flush() {
    if let Some(handle) = LOGGER_HANDLE.lock().as_ref() {
        handle.flush();
    }
}

/// 刷新并关闭日志系统
pub fn shutdown() {
    if let Some(handle) = LOGGER_HANDLE.lock().take() {
        handle.flush();
    }
}

pub fn is_initialized() -> bool {
    LOGGER_HANDLE.lock().is_some()
}
