//! Scoped use of a remote connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{ConnectionFactory, RemoteConnection};
use crate::error::{ConnectorError, Result};

/// Future returned by an operation run inside [`with_connection`].
pub type ConnectionOp<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Shared runtime for the `blocking_*` entry points.
pub fn blocking_runtime() -> Result<&'static Runtime> {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ConnectorError::config(format!("failed to create tokio runtime: {e}")))?;
    // A concurrent caller may have won the race; its runtime is kept.
    let _ = RUNTIME.set(runtime);
    RUNTIME
        .get()
        .ok_or_else(|| ConnectorError::config("tokio runtime was not initialized"))
}

/// Opens a connection, runs `op` on it and always closes it afterwards.
///
/// If `cancel` fires while `op` is in flight, the operation is dropped, the
/// connection is still closed and `ConnectorError::Cancelled` is returned.
/// A failing close is only reported when `op` itself succeeded; otherwise it
/// is logged and the original error wins.
pub async fn with_connection<T, F>(
    factory: &dyn ConnectionFactory,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut dyn RemoteConnection) -> ConnectionOp<'c, T> + Send,
{
    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }

    let mut conn = tokio::select! {
        conn = factory.connect() => conn?,
        _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
    };
    debug!("Opened remote connection");

    let outcome = {
        let fut = op(conn.as_mut());
        tokio::select! {
            result = fut => result,
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        }
    };

    let closed = conn.close().await;
    debug!("Closed remote connection");

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close remote connection after error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ResultSet;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeConnection {
        counters: Arc<Counters>,
        fail_close: bool,
        stall: bool,
    }

    #[async_trait]
    impl RemoteConnection for FakeConnection {
        async fn execute(&mut self, sql: &str) -> Result<()> {
            if sql.contains("FAIL") {
                return Err(ConnectorError::query("boom"));
            }
            Ok(())
        }

        async fn execute_query(&mut self, _sql: &str) -> Result<ResultSet> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(ResultSet::default())
        }

        async fn close(&mut self) -> Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ConnectorError::connection("close failed"));
            }
            Ok(())
        }
    }

    struct FakeFactory {
        counters: Arc<Counters>,
        fail_close: bool,
        stall: bool,
    }

    impl FakeFactory {
        fn new() -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                fail_close: false,
                stall: false,
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        async fn connect(&self) -> Result<Box<dyn RemoteConnection>> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                counters: Arc::clone(&self.counters),
                fail_close: self.fail_close,
                stall: self.stall,
            }))
        }
    }

    #[tokio::test]
    async fn test_closes_on_success() {
        let factory = FakeFactory::new();
        let value = with_connection(&factory, &CancellationToken::new(), |conn| {
            Box::pin(async move {
                conn.execute("SELECT 1").await?;
                Ok(42)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(factory.counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closes_on_error() {
        let factory = FakeFactory::new();
        let err = with_connection(&factory, &CancellationToken::new(), |conn| {
            Box::pin(async move { conn.execute("FAIL").await })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::Query { .. }));
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_original_error_wins_over_close_error() {
        let mut factory = FakeFactory::new();
        factory.fail_close = true;
        let err = with_connection(&factory, &CancellationToken::new(), |conn| {
            Box::pin(async move { conn.execute("FAIL").await })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ConnectorError::Query { .. }));

        let err = with_connection(&factory, &CancellationToken::new(), |conn| {
            Box::pin(async move { conn.execute("SELECT 1").await })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_closes_connection() {
        let mut factory = FakeFactory::new();
        factory.stall = true;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = with_connection(&factory, &cancel, |conn| {
            Box::pin(async move { conn.execute_query("SELECT 1").await })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::Cancelled));
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_connects() {
        let factory = FakeFactory::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = with_connection(&factory, &cancel, |conn| {
            Box::pin(async move { conn.execute("SELECT 1").await })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::Cancelled));
        assert_eq!(factory.counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_runtime_is_shared() {
        let a = blocking_runtime().unwrap() as *const Runtime;
        let b = blocking_runtime().unwrap() as *const Runtime;
        assert_eq!(a, b);
    }
}
