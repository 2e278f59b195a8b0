//! Unit of Work
//!
//! 在一个事务作用域内执行多次仓储写入：全部提交或全部回滚。
//!
//! ```text
//! run_in_tx(uow, || async {
//!     repo_a.update(..).await?;   ─┐
//!     repo_b.insert(..).await?;    ├─ 同一事务
//!     Ok(value)                   ─┘
//! })
//!   Ok  → commit
//!   Err → rollback，原样返回错误
//!   drop (取消) → 实现方负责回滚
//! ```
//!
//! 事务可通过 [`TxScope`] 把自身状态挂到当前任务上，仓储据此把
//! 写入归属到该事务；同一存储上的其他任务不受影响。

use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use super::repository::{RepoError, RepoResult};

tokio::task_local! {
    static ACTIVE_TX: TxScope;
}

/// 当前任务所处事务的实现方状态
#[derive(Clone)]
pub struct TxScope(Arc<dyn Any + Send + Sync>);

impl TxScope {
    pub fn new<T: Any + Send + Sync>(state: Arc<T>) -> Self {
        Self(state)
    }

    /// `run_in_tx` 作用域之外为 `None`
    pub fn current() -> Option<Self> {
        ACTIVE_TX.try_with(Clone::clone).ok()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }
}

/// 已开启的事务
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> RepoResult<()>;
    async fn rollback(self: Box<Self>);

    /// 需要把写入归属到本事务的实现返回其状态
    fn scope(&self) -> Option<TxScope> {
        None
    }
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> RepoResult<Box<dyn Transaction>>;
}

/// 串行默认实现：不提供隔离，直接透传
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughUnitOfWork;

struct NoopTransaction;

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> RepoResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}

#[async_trait]
impl UnitOfWork for PassThroughUnitOfWork {
    async fn begin(&self) -> RepoResult<Box<dyn Transaction>> {
        Ok(Box::new(NoopTransaction))
    }
}

/// 在事务中运行 `work`
///
/// Nested calls against the same store are not supported.
pub async fn run_in_tx<T, E, F, Fut>(uow: &dyn UnitOfWork, work: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepoError>,
{
    let tx = uow.begin().await?;
    let outcome = match tx.scope() {
        Some(scope) => ACTIVE_TX.scope(scope, work()).await,
        None => work().await,
    };
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback().await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pass_through_returns_value() {
        let uow = PassThroughUnitOfWork;
        let result: Result<i32, RepoError> = run_in_tx(&uow, || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_pass_through_propagates_error() {
        let uow = PassThroughUnitOfWork;
        let result: Result<(), RepoError> =
            run_in_tx(&uow, || async { Err(RepoError::Conflict("stale".into())) }).await;
        assert_eq!(result, Err(RepoError::Conflict("stale".into())));
    }

    struct Marker(u32);

    struct ScopedTransaction(Arc<Marker>);

    #[async_trait]
    impl Transaction for ScopedTransaction {
        async fn commit(self: Box<Self>) -> RepoResult<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) {}

        fn scope(&self) -> Option<TxScope> {
            Some(TxScope::new(self.0.clone()))
        }
    }

    struct ScopedUnitOfWork;

    #[async_trait]
    impl UnitOfWork for ScopedUnitOfWork {
        async fn begin(&self) -> RepoResult<Box<dyn Transaction>> {
            Ok(Box::new(ScopedTransaction(Arc::new(Marker(42)))))
        }
    }

    #[tokio::test]
    async fn test_scope_visible_only_inside_work() {
        assert!(TxScope::current().is_none());
        let seen: Result<Option<u32>, RepoError> = run_in_tx(&ScopedUnitOfWork, || async {
            Ok(TxScope::current()
                .and_then(|scope| scope.downcast::<Marker>())
                .map(|marker| marker.0))
        })
        .await;
        assert_eq!(seen, Ok(Some(42)));
        assert!(TxScope::current().is_none());

        // 其他任务看不到该作用域
        let spawned: Result<bool, RepoError> = run_in_tx(&ScopedUnitOfWork, || async {
            Ok(tokio::spawn(async { TxScope::current().is_none() })
                .await
                .unwrap_or(false))
        })
        .await;
        assert_eq!(spawned, Ok(true));
    }
}
