use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use super::{Repository, TrackedEntity};
use crate::errors::ServiceError;

/// A database transaction handing out repositories that share it.
///
/// Nothing is persisted until [`commit`](Self::commit). Dropping the unit
/// of work without committing rolls back.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
}

impl UnitOfWork {
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, ServiceError> {
        let txn = db.begin().await?;
        Ok(Self { txn })
    }

    pub fn repo<E>(&self) -> Repository<'_, DatabaseTransaction, E>
    where
        E: TrackedEntity,
        E::Model: Sync,
    {
        Repository::new(&self.txn)
    }

    /// Raw access for queries that don't fit the generic repository.
    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), ServiceError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ServiceError> {
        self.txn.rollback().await?;
        Ok(())
    }
}
