//! 自定义断言辅助模块
//!
//! 提供测试中的常用断言函数

use localtx::transaction::{
    ResourceManager, TransactionContext, TransactionStatus, TransactionalResource,
};

/// 断言结果失败并匹配错误消息
pub fn assert_err_with<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>, expected_msg: &str) {
    let err = result.expect_err("操作应该失败");
    let err_str = err.to_string();
    assert!(
        err_str.contains(expected_msg),
        "错误消息应包含 '{}', 实际是 '{}'",
        expected_msg,
        err_str
    );
}

/// 断言事务已结束：处于期望状态、已完成且不在活跃事务表中
pub fn assert_finished<R: TransactionalResource>(
    manager: &ResourceManager<R>,
    context: &TransactionContext<R>,
    expected: TransactionStatus,
) {
    assert_eq!(context.status(), Some(expected), "事务状态不匹配: {}", context);
    assert!(context.is_finished(), "事务应该已结束: {}", context);
    assert!(
        !manager.is_transaction_active(context.id),
        "事务应该已不在活跃列表中: {}",
        context
    );
}

/// 断言事务仍然活跃
pub fn assert_active<R: TransactionalResource>(
    manager: &ResourceManager<R>,
    context: &TransactionContext<R>,
) {
    assert!(!context.is_finished(), "事务不应结束: {}", context);
    assert!(
        manager.is_transaction_active(context.id),
        "事务应该在活跃列表中: {}",
        context
    );
}
