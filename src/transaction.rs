use libsql::Connection;
use std::future::Future;
use std::pin::Pin;

use crate::Db;

/// Execute a function within a database transaction, returning handler-compatible errors.
///
/// The write lock is held for the whole transaction, so no other request can
/// interleave statements. The closure must return a boxed future to handle
/// lifetime issues with async closures.
///
/// ```ignore
/// with_transaction(&db, |conn| {
///     Box::pin(async move {
///         conn.execute("UPDATE ...", ()).await.map_err(|_| MyError::Db)?;
///         Ok(())
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &Db, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a Connection) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
    E: From<TransactionError>,
{
    let conn = db.write().await;

    conn.execute("BEGIN IMMEDIATE TRANSACTION", ())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to begin transaction");
            TransactionError::Begin
        })?;

    match f(&*conn).await {
        Ok(result) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                tracing::error!(error = %e, "failed to commit transaction");
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(TransactionError::Commit.into());
            }
            Ok(result)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}

/// Errors that can occur during transaction management
#[derive(Debug)]
pub enum TransactionError {
    Begin,
    Commit,
}
