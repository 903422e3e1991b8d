//! HTML pages for browsers opening a paste link.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::api::PasteView;

#[derive(Template)]
#[template(path = "view_paste.html")]
pub struct PastePage<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub remaining_views: Option<u32>,
    pub expires_at: Option<&'a str>,
}

impl<'a> PastePage<'a> {
    #[must_use]
    pub fn new(id: &'a str, view: &'a PasteView) -> Self {
        Self {
            id,
            content: &view.content,
            remaining_views: view.remaining_views,
            expires_at: view.expires_at.as_deref(),
        }
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundPage;

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage<'a> {
    pub error_id: &'a str,
}

/// Renders `template` with `status`, degrading to plain text if rendering fails.
pub fn render_page(status: StatusCode, template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(?err, "Template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paste_page_escapes_content() {
        let view = PasteView {
            content: "<script>alert('hi')</script> & more".to_owned(),
            remaining_views: Some(3),
            expires_at: Some("2030-01-01T00:00:00Z".to_owned()),
        };
        let html = PastePage::new("abcDEF1234", &view).render().unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; more"));
        assert!(html.contains("Paste abcDEF1234"));
        assert!(html.contains("3 view(s) remaining."));
        assert!(html.contains("Expires at 2030-01-01T00:00:00Z."));
    }

    #[test]
    fn test_paste_page_without_limits() {
        let view = PasteView {
            content: "hello".to_owned(),
            remaining_views: None,
            expires_at: None,
        };
        let html = PastePage::new("abcDEF1234", &view).render().unwrap();

        assert!(html.contains("<pre>hello</pre>"));
        assert!(!html.contains("remaining"));
        assert!(!html.contains("Expires at"));
    }

    #[test]
    fn test_not_found_page() {
        let html = NotFoundPage.render().unwrap();
        assert!(html.contains("404 - Paste Not Found or Expired"));
    }

    #[test]
    fn test_render_page_sets_status() {
        let response = render_page(StatusCode::NOT_FOUND, &NotFoundPage);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = render_page(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorPage { error_id: "id-1" },
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
