//! Generic data access over sea-orm entities.
//!
//! Every tracked table carries an integer `version` column. Writes go
//! through [`Repository::update_versioned`] / [`Repository::delete`], which
//! only touch the row when the caller's expected version still matches.

use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityName, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QuerySelect, Select,
};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::errors::ServiceError;

pub mod unit_of_work;

pub use unit_of_work::UnitOfWork;

/// An entity with a UUID key and a row-version column.
pub trait TrackedEntity: EntityTrait {
    fn id_column() -> Self::Column;
    fn version_column() -> Self::Column;
    fn updated_at_column() -> Self::Column;

    fn name() -> String {
        Self::default().table_name().to_string()
    }
}

/// Repository bound to either a pooled connection or an open transaction.
#[derive(Debug)]
pub struct Repository<'c, C, E> {
    conn: &'c C,
    _entity: PhantomData<E>,
}

impl<'c, C, E> Repository<'c, C, E>
where
    C: ConnectionTrait,
    E: TrackedEntity,
    E::Model: Sync,
{
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    pub fn connection(&self) -> &'c C {
        self.conn
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<E::Model>, ServiceError> {
        Ok(E::find()
            .filter(E::id_column().eq(id))
            .one(self.conn)
            .await?)
    }

    /// Like [`find`](Self::find) but a missing row is a `NotFound` error.
    pub async fn get(&self, id: Uuid) -> Result<E::Model, ServiceError> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(&E::name(), id))
    }

    /// Reads the row with an exclusive lock where the backend supports one.
    pub async fn get_for_update(&self, id: Uuid) -> Result<E::Model, ServiceError> {
        E::find()
            .filter(E::id_column().eq(id))
            .lock_exclusive()
            .one(self.conn)
            .await?
            .ok_or_else(|| ServiceError::not_found(&E::name(), id))
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, ServiceError> {
        let count = E::find()
            .filter(E::id_column().eq(id))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn count(&self, select: Select<E>) -> Result<u64, ServiceError> {
        Ok(select.count(self.conn).await?)
    }

    /// Returns one 1-based page of `select` together with the total row count.
    pub async fn page(
        &self,
        select: Select<E>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<E::Model>, u64), ServiceError> {
        let paginator = select.paginate(self.conn, per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.max(1) - 1).await?;
        Ok((rows, total))
    }

    pub async fn insert<A>(&self, model: A) -> Result<E::Model, ServiceError>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
    {
        model
            .insert(self.conn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, &E::name()))
    }

    /// Applies `changes` only if the stored version still equals `expected`.
    ///
    /// The version is bumped to `expected + 1` in the same statement. When
    /// nothing matched, the row is either gone (`NotFound`) or was changed by
    /// someone else (`ConcurrentModification`).
    pub async fn update_versioned<A>(
        &self,
        id: Uuid,
        expected: i32,
        mut changes: A,
    ) -> Result<E::Model, ServiceError>
    where
        A: ActiveModelTrait<Entity = E> + Send,
    {
        changes.set(E::version_column(), (expected + 1).into());
        changes.set(E::updated_at_column(), Utc::now().into());

        let result = E::update_many()
            .set(changes)
            .filter(E::id_column().eq(id))
            .filter(E::version_column().eq(expected))
            .exec(self.conn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, &E::name()))?;

        if result.rows_affected == 0 {
            return Err(self.miss(id).await?);
        }

        self.get(id).await
    }

    /// Deletes the row if its version still equals `expected`.
    pub async fn delete(&self, id: Uuid, expected: i32) -> Result<(), ServiceError> {
        let result = E::delete_many()
            .filter(E::id_column().eq(id))
            .filter(E::version_column().eq(expected))
            .exec(self.conn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, &E::name()))?;

        if result.rows_affected == 0 {
            return Err(self.miss(id).await?);
        }
        Ok(())
    }

    async fn miss(&self, id: Uuid) -> Result<ServiceError, ServiceError> {
        Ok(if self.exists(id).await? {
            ServiceError::ConcurrentModification(id)
        } else {
            ServiceError::not_found(&E::name(), id)
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig, DbPool};
    use crate::entities::{location, LocationType};
    use sea_orm::Set;

    pub async fn temp_db(dir: &tempfile::TempDir) -> DbPool {
        let path = dir.path().join("repo-test.sqlite");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub fn warehouse(code: &str) -> location::ActiveModel {
        location::ActiveModel {
            code: Set(code.to_string()),
            name: Set(format!("Warehouse {}", code)),
            location_type: Set(LocationType::Warehouse),
            parent_id: Set(None),
            description: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
    }
}
