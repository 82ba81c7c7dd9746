//! Repository contract and the backend-generic implementation.
//!
//! [`Repo`] targets exactly one table for its lifetime. Every failure is
//! returned as a [`RepoError`] tagged with the caller's namespace; nothing is
//! retried and no operation touches more than one row, except `clear`.

use std::any::Any;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{BackendError, Cause, ErrorKind, RepoError};
use crate::field::{field_map, hydrate, FieldValue, Persisted};
use crate::{Context, TableName};

/// Read side of the repository contract.
pub trait ReadRepo<E>: Send + Sync {
    /// The repository this one decorates, if any.
    fn parent(&self) -> Option<&dyn ReadRepo<E>>;

    fn find(&self, ctx: &Context, id: Uuid) -> Result<E, RepoError>;

    /// All stored entities, in backend order.
    fn find_all(&self, ctx: &Context) -> Result<Vec<E>, RepoError>;

    /// Used by [`repository`] to recognise a concrete repository in a chain.
    fn as_any(&self) -> &dyn Any;
}

/// Write side of the repository contract.
pub trait WriteRepo<E>: Send + Sync {
    /// Insert or fully replace the stored entity with the same id.
    fn save(&self, ctx: &Context, entity: &E) -> Result<(), RepoError>;

    fn remove(&self, ctx: &Context, id: Uuid) -> Result<(), RepoError>;
}

pub trait ReadWriteRepo<E>: ReadRepo<E> + WriteRepo<E> {}

impl<E, T: ReadRepo<E> + WriteRepo<E>> ReadWriteRepo<E> for T {}

/// Parameters for a filtered query over a secondary index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexInput {
    pub index_name: String,
    pub partition_key: String,
    pub partition_key_value: FieldValue,
    pub sort_key: Option<String>,
    pub sort_key_value: Option<FieldValue>,
}

type Factory<E> = Box<dyn Fn() -> E + Send + Sync>;

/// Repository over one table, generic over entity type and storage backend.
pub struct Repo<E, B> {
    backend: B,
    table: TableName,
    factory: Option<Factory<E>>,
}

impl<E: Persisted, B: Backend> Repo<E, B> {
    /// Dial the backend and bind the repository to `table`.
    pub fn connect(table: TableName, config: &B::Config) -> Result<Self, RepoError> {
        let backend = B::connect(config).map_err(|e| {
            warn!(table = %table, error = %e, "could not dial backend");
            RepoError::new(ErrorKind::DialFailure, "").with_cause(e)
        })?;
        info!(table = %table, "repository connected");
        Ok(Self::with_backend(table, backend))
    }

    /// Wrap an already connected backend.
    pub fn with_backend(table: TableName, backend: B) -> Self {
        Self {
            backend,
            table,
            factory: None,
        }
    }

    /// Set the function that creates empty entities for reads.
    pub fn set_entity_factory<F>(&mut self, factory: F)
    where
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.factory = Some(Box::new(factory));
    }

    /// The table every operation targets. Independent of the namespace.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn factory(&self, ctx: &Context) -> Result<&Factory<E>, RepoError> {
        self.factory
            .as_ref()
            .ok_or_else(|| RepoError::new(ErrorKind::ModelNotSet, ctx.namespace()))
    }

    fn fail(&self, ctx: &Context, kind: ErrorKind, cause: impl Into<Cause>) -> RepoError {
        let cause = cause.into();
        let kind = match &cause {
            Cause::Backend(BackendError::NotConnected) => ErrorKind::NoBackendConnection,
            _ => kind,
        };
        warn!(
            table = %self.table,
            namespace = ctx.namespace(),
            kind = %kind,
            error = %cause,
            "repository operation failed"
        );
        RepoError::new(kind, ctx.namespace()).with_cause(cause)
    }

    /// Filtered queries are not supported; returns no entities.
    pub fn find_with_filter(
        &self,
        ctx: &Context,
        _expr: &str,
        _args: &[FieldValue],
    ) -> Result<Vec<E>, RepoError> {
        self.factory(ctx)?;
        Ok(Vec::new())
    }

    /// Index queries are not supported; returns no entities.
    pub fn find_with_filter_using_index(
        &self,
        ctx: &Context,
        _index: &IndexInput,
        _filter: &str,
        _args: &[FieldValue],
    ) -> Result<Vec<E>, RepoError> {
        self.factory(ctx)?;
        Ok(Vec::new())
    }

    /// Delete every row of the table in one transaction.
    pub fn clear(&self, ctx: &Context) -> Result<(), RepoError> {
        self.backend
            .delete_all(&self.table)
            .map_err(|e| self.fail(ctx, ErrorKind::CouldNotClearDB, e))?;
        debug!(table = %self.table, "table cleared");
        Ok(())
    }

    /// Release the backend connection.
    pub fn close(&self, ctx: &Context) -> Result<(), RepoError> {
        self.backend
            .close()
            .map_err(|e| self.fail(ctx, ErrorKind::NoBackendConnection, e))?;
        info!(table = %self.table, "repository closed");
        Ok(())
    }
}

impl<E: Persisted + Default, B: Backend> Repo<E, B> {
    /// Use `E::default` as the entity factory.
    pub fn with_default_factory(mut self) -> Self {
        self.set_entity_factory(E::default);
        self
    }
}

impl<E: Persisted, B: Backend + 'static> ReadRepo<E> for Repo<E, B> {
    fn parent(&self) -> Option<&dyn ReadRepo<E>> {
        None
    }

    fn find(&self, ctx: &Context, id: Uuid) -> Result<E, RepoError> {
        let factory = self.factory(ctx)?;
        let row = self
            .backend
            .select_by_id(&self.table, id)
            .map_err(|e| self.fail(ctx, ErrorKind::EntityNotFound, e))?
            .ok_or_else(|| RepoError::new(ErrorKind::EntityNotFound, ctx.namespace()))?;
        hydrate(factory(), row).map_err(|e| self.fail(ctx, ErrorKind::EntityNotFound, e))
    }

    fn find_all(&self, ctx: &Context) -> Result<Vec<E>, RepoError> {
        let factory = self.factory(ctx)?;
        let rows = self
            .backend
            .scan_all(&self.table)
            .map_err(|e| self.fail(ctx, ErrorKind::EntityNotFound, e))?;
        rows.into_iter()
            .map(|row| {
                hydrate(factory(), row).map_err(|e| self.fail(ctx, ErrorKind::EntityNotFound, e))
            })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<E: Persisted, B: Backend + 'static> WriteRepo<E> for Repo<E, B> {
    fn save(&self, ctx: &Context, entity: &E) -> Result<(), RepoError> {
        let id = entity.entity_id();
        if id.is_nil() {
            return Err(RepoError::new(ErrorKind::CouldNotSaveEntity, ctx.namespace())
                .with_cause(ErrorKind::MissingEntityID));
        }

        let fields = field_map(entity);
        debug!(table = %self.table, %id, columns = ?fields.columns(), "upserting entity");
        let affected = self
            .backend
            .upsert(&self.table, &fields)
            .map_err(|e| self.fail(ctx, ErrorKind::CouldNotSaveEntity, e))?;
        if affected != 1 {
            return Err(self.fail(ctx, ErrorKind::CouldNotSaveEntity, Cause::RowsAffected(affected)));
        }
        Ok(())
    }

    fn remove(&self, ctx: &Context, id: Uuid) -> Result<(), RepoError> {
        let affected = self
            .backend
            .delete_by_id(&self.table, id)
            .map_err(|e| self.fail(ctx, ErrorKind::CouldNotRemoveEntity, e))?;
        match affected {
            1 => Ok(()),
            0 => Err(RepoError::new(ErrorKind::EntityNotFound, ctx.namespace())),
            n => Err(self.fail(ctx, ErrorKind::EntityNotFound, Cause::RowsAffected(n))),
        }
    }
}

/// Walk the `parent` chain starting at `repo` until a `Repo<E, B>` is found.
pub fn repository<'a, E, B>(mut repo: Option<&'a dyn ReadRepo<E>>) -> Option<&'a Repo<E, B>>
where
    E: Persisted,
    B: Backend + 'static,
{
    while let Some(current) = repo {
        if let Some(found) = current.as_any().downcast_ref::<Repo<E, B>>() {
            return Some(found);
        }
        repo = current.parent();
    }
    None
}
