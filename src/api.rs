use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreatePastePayload {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedPaste {
    pub id: String,
    pub url: String,
}

/// A successfully consumed paste, reflecting the view that was just counted.
#[derive(Debug, Serialize)]
pub struct PasteView {
    pub content: String,
    pub remaining_views: Option<u32>,
    /// Timestamp in RFC 3339 format
    pub expires_at: Option<String>,
}

#[derive(Serialize)]
pub struct Health {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct Error {
    pub error: String,
    pub error_id: String,
}
