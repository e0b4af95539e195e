use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::repositories::RepositoryError;
use crate::DbPool;

/// One SQLite transaction shared by every store touched while handling a single message.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub async fn begin(pool: &DbPool) -> Result<Self, RepositoryError> {
        Ok(Self { tx: pool.begin().await? })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
