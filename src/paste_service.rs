use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use rearch::CapsuleHandle;
use thiserror::Error;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::{
    api::{CreatePastePayload, CreatedPaste, PasteView},
    config::base_url_capsule,
    orm::paste,
    paste_repo::{
        ConsumeError, NotFoundReason, PasteRepository, SavePasteError, paste_repository_capsule,
    },
};

/// Length of every generated paste ID.
pub const PASTE_ID_LEN: usize = 10;

pub fn paste_rest_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn PasteRestService> {
    let paste_repo = Arc::clone(get.as_ref(paste_repository_capsule));
    let base_url = get.as_ref(base_url_capsule).clone();
    Arc::new(PasteRestServiceImpl {
        paste_repo,
        base_url,
    })
}

#[async_trait]
pub trait PasteRestService: Send + Sync {
    async fn create_paste(
        &self,
        payload: CreatePastePayload,
    ) -> Result<CreatedPaste, CreatePasteError>;

    /// Reads the paste and counts the view, as seen at `now`.
    async fn fetch_paste(&self, id: &str, now: OffsetDateTime)
    -> Result<PasteView, FetchPasteError>;

    async fn health(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum FetchPasteError {
    /// Carries the reason for logging only; callers must not expose it.
    #[error("paste not found")]
    NotFound(NotFoundReason),
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum CreatePasteError {
    #[error("content must not be empty")]
    EmptyContent,
    #[error("ttl_seconds must be >= 1 and within the supported date range, got {0}")]
    InvalidTtl(i64),
    #[error("max_views must be between 1 and {max}, got {0}", max = i32::MAX)]
    InvalidMaxViews(i64),
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct PasteRestServiceImpl {
    paste_repo: Arc<dyn PasteRepository>,
    base_url: Url,
}

impl PasteRestServiceImpl {
    fn paste_url(&self, id: &str) -> String {
        format!("{}/p/{id}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl PasteRestService for PasteRestServiceImpl {
    #[instrument(skip(self, payload), fields(content_len = payload.content.len()))]
    async fn create_paste(
        &self,
        payload: CreatePastePayload,
    ) -> Result<CreatedPaste, CreatePasteError> {
        const SAVE_ATTEMPTS: usize = 3;

        let created_at = OffsetDateTime::now_utc();
        let Limits {
            max_views,
            expires_at,
        } = Limits::validate(&payload, created_at)?;

        for _ in 0..SAVE_ATTEMPTS {
            let attempt_id = generate_paste_id();
            let to_save = paste::Model {
                id: attempt_id.clone(),
                content: payload.content.clone(),
                max_views,
                views_count: 0,
                expires_at,
                created_at,
            };

            match self.paste_repo.save_paste(to_save).await {
                Ok(saved) => {
                    info!(id = saved.id, ?max_views, ?expires_at, "Created paste");
                    return Ok(CreatedPaste {
                        url: self.paste_url(&saved.id),
                        id: saved.id,
                    });
                }
                // NOTE: collisions are retryable with a fresh ID
                Err(SavePasteError::IdAlreadyTaken) => {
                    warn!(attempt_id, "Generated paste ID that was already taken");
                }
                Err(SavePasteError::Internal(err)) => {
                    error!(?err, "Failed to save paste");
                    return Err(CreatePasteError::Internal(
                        err.context("Failed to save paste"),
                    ));
                }
            }
        }

        Err(CreatePasteError::Internal(anyhow!("Exhausted retry attempts")))
    }

    #[instrument(skip(self))]
    async fn fetch_paste(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> Result<PasteView, FetchPasteError> {
        match self.paste_repo.consume_paste(id, now).await {
            Ok(paste) => paste
                .try_into()
                .context("Failed to convert consumed paste into external format")
                .map_err(FetchPasteError::Internal),
            Err(ConsumeError::NotFound(reason)) => {
                info!(id, %reason, "Paste is not available");
                Err(FetchPasteError::NotFound(reason))
            }
            Err(ConsumeError::Internal(err)) => Err(FetchPasteError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn health(&self) -> anyhow::Result<()> {
        self.paste_repo.ping().await
    }
}

/// Validated view/expiry limits of a paste about to be created.
#[derive(Debug, PartialEq, Eq)]
struct Limits {
    max_views: Option<i32>,
    expires_at: Option<OffsetDateTime>,
}

impl Limits {
    fn validate(
        payload: &CreatePastePayload,
        created_at: OffsetDateTime,
    ) -> Result<Self, CreatePasteError> {
        if payload.content.trim().is_empty() {
            return Err(CreatePasteError::EmptyContent);
        }

        let expires_at = payload
            .ttl_seconds
            .map(|ttl| {
                (ttl >= 1)
                    .then(|| created_at.checked_add(Duration::seconds(ttl)))
                    .flatten()
                    .ok_or(CreatePasteError::InvalidTtl(ttl))
            })
            .transpose()?;

        let max_views = payload
            .max_views
            .map(|max| {
                i32::try_from(max)
                    .ok()
                    .filter(|max| *max >= 1)
                    .ok_or(CreatePasteError::InvalidMaxViews(max))
            })
            .transpose()?;

        Ok(Self {
            max_views,
            expires_at,
        })
    }
}

/// Generates a random, fixed-length, URL-safe paste ID.
#[must_use]
pub fn generate_paste_id() -> String {
    // NOTE: every number in [62^9, 62^10) has exactly 10 base62 digits
    const MIN: u64 = 62_u64.pow(PASTE_ID_LEN as u32 - 1);
    const SPAN: u64 = 62_u64.pow(PASTE_ID_LEN as u32) - MIN;
    base62::encode(rand::random_range(MIN..MIN + SPAN))
}

impl TryFrom<paste::Model> for PasteView {
    type Error = anyhow::Error;

    fn try_from(
        paste::Model {
            content,
            max_views,
            views_count,
            expires_at,
            ..
        }: paste::Model,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            content,
            remaining_views: max_views
                .map(|max_views| u32::try_from(max_views - views_count))
                .transpose()
                .context("views_count exceeded max_views")?,
            expires_at: expires_at
                .map(|expires_at| expires_at.format(&Rfc3339))
                .transpose()
                .context("Failed to format expiration timestamp")?,
        })
    }
}
