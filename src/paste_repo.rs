use std::{fmt, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, DbConn, DbErr,
    EntityTrait, QueryFilter, QuerySelect, SqlErr, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::{config::db_conn_capsule, orm::paste};

pub fn paste_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn PasteRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    new_paste_repository(db)
}

#[must_use]
pub fn new_paste_repository(db: DbConn) -> Arc<dyn PasteRepository> {
    Arc::new(PasteRepositoryImpl { db })
}

#[async_trait]
pub trait PasteRepository: Send + Sync {
    /// Atomically checks that the paste is accessible at `now` and counts one view.
    ///
    /// Returns the paste as it is after the increment. A failed check leaves
    /// the row untouched.
    async fn consume_paste(&self, id: &str, now: OffsetDateTime)
    -> Result<paste::Model, ConsumeError>;

    async fn save_paste(&self, paste: paste::Model) -> Result<paste::Model, SavePasteError>;

    async fn ping(&self) -> anyhow::Result<()>;
}

/// Why a paste could not be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    Missing,
    Expired,
    Exhausted,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "not found",
            Self::Expired => "expired",
            Self::Exhausted => "view limit exceeded",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("paste unavailable: {0}")]
    NotFound(NotFoundReason),
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum SavePasteError {
    #[error("a paste with this ID already exists")]
    IdAlreadyTaken,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

/// Whether `paste` may be read at `now`, judged on its state before this read.
///
/// # Errors
/// Returns the [`NotFoundReason`] that makes the paste inaccessible.
pub fn check_access(paste: &paste::Model, now: OffsetDateTime) -> Result<(), NotFoundReason> {
    if paste.expires_at.is_some_and(|expires_at| expires_at < now) {
        return Err(NotFoundReason::Expired);
    }
    if paste
        .max_views
        .is_some_and(|max_views| paste.views_count >= max_views)
    {
        return Err(NotFoundReason::Exhausted);
    }
    Ok(())
}

struct PasteRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl PasteRepository for PasteRepositoryImpl {
    #[instrument(skip(self))]
    async fn consume_paste(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> Result<paste::Model, ConsumeError> {
        let txn = self
            .db
            .begin()
            .await
            .context("Failed to begin consume transaction")
            .map_err(ConsumeError::Internal)?;

        // NOTE: concurrent consumers of the same paste queue up on this row lock
        let found = paste::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .context("Failed to lock paste row")
            .map_err(ConsumeError::Internal)?;

        let Some(paste) = found else {
            rollback(txn).await?;
            return Err(ConsumeError::NotFound(NotFoundReason::Missing));
        };
        if let Err(reason) = check_access(&paste, now) {
            rollback(txn).await?;
            return Err(ConsumeError::NotFound(reason));
        }

        paste::Entity::update_many()
            .col_expr(
                paste::Column::ViewsCount,
                Expr::col(paste::Column::ViewsCount).add(1),
            )
            .filter(paste::Column::Id.eq(id))
            .exec(&txn)
            .await
            .context("Failed to increment views_count")
            .map_err(ConsumeError::Internal)?;

        txn.commit()
            .await
            .context("Failed to commit consume transaction")
            .map_err(ConsumeError::Internal)?;

        Ok(paste::Model {
            views_count: paste.views_count + 1,
            ..paste
        })
    }

    #[instrument(skip(self))]
    async fn save_paste(&self, paste: paste::Model) -> Result<paste::Model, SavePasteError> {
        let to_insert = paste::ActiveModel {
            id: Set(paste.id),
            content: Set(paste.content),
            max_views: Set(paste.max_views),
            views_count: Set(paste.views_count),
            expires_at: Set(paste.expires_at),
            created_at: Set(paste.created_at),
        };
        to_insert.insert(&self.db).await.map_err(|err: DbErr| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                warn!("Paste ID collided with an existing row");
                SavePasteError::IdAlreadyTaken
            } else {
                SavePasteError::Internal(anyhow::Error::new(err).context("Failed to insert paste"))
            }
        })
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> anyhow::Result<()> {
        self.db.ping().await.context("Database ping failed")
    }
}

async fn rollback(txn: DatabaseTransaction) -> Result<(), ConsumeError> {
    txn.rollback()
        .await
        .context("Failed to roll back rejected consume")
        .map_err(ConsumeError::Internal)
}
