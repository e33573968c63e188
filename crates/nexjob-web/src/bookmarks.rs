//! Saved jobs: the bookmarks page, toggle buttons, and the live change stream.

use std::convert::Infallible;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::{header::HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{self, Stream, StreamExt};
use nexjob_core::AnalyticsEvent;
use serde_json::json;

use crate::listing::{job_cards, JobCard};
use crate::seo::{self, Crumb, PageMeta};
use crate::session::ClientId;
use crate::{render_html, server_error, AppState, Chrome};

#[derive(Template)]
#[template(path = "bookmarks.html")]
struct BookmarksTemplate {
    chrome: Chrome,
    cards: Vec<JobCard>,
    missing: usize,
}

#[derive(Template)]
#[template(path = "bookmark_button.html")]
pub struct BookmarkButtonTemplate {
    pub job_id: String,
    pub bookmarked: bool,
}

pub async fn bookmarks_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
) -> Response {
    let bookmarks = match state.bookmarks_for(&client) {
        Ok(bookmarks) => bookmarks,
        Err(err) => return server_error(err.into()),
    };
    let ids = match bookmarks.list().await {
        Ok(ids) => ids,
        Err(err) => return server_error(err.into()),
    };
    let source = state.source().await;
    let jobs = futures::future::join_all(ids.iter().map(|id| source.fetch_job_by_id(id)))
        .await
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    let base = state.config.site_url_trimmed().to_string();

    state.track(AnalyticsEvent::PageView {
        path: "/bookmarks/".into(),
        page_type: "bookmarks".into(),
        category: None,
        location: None,
    });

    let meta = PageMeta::website(
        "Lowongan Tersimpan - Nexjob",
        "Kelola lowongan kerja yang telah Anda simpan di Nexjob",
        format!("{base}/bookmarks/"),
    );
    let json_ld = seo::script_body(&[seo::breadcrumbs(&base, &[Crumb::here("Lowongan Tersimpan")])]);
    render_html(BookmarksTemplate {
        chrome: state.chrome(meta, json_ld),
        missing: ids.len() - jobs.len(),
        cards: job_cards(&state, &client, &jobs).await,
    })
}

/// Flips one job and returns its refreshed button.
pub async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    AxumPath(job_id): AxumPath<String>,
) -> Response {
    let added = match state.bookmarks_for(&client) {
        Ok(bookmarks) => bookmarks.toggle(&job_id).await,
        Err(err) => Err(err),
    };
    let added = match added {
        Ok(added) => added,
        Err(err) => return server_error(err.into()),
    };
    state.track(AnalyticsEvent::BookmarkToggled {
        job_id: job_id.clone(),
        added,
    });
    let mut resp = render_html(BookmarkButtonTemplate {
        job_id,
        bookmarked: added,
    });
    resp.headers_mut().insert(
        HeaderName::from_static("hx-trigger"),
        HeaderValue::from_static("bookmarksChanged"),
    );
    resp
}

pub async fn count_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
) -> Response {
    let count = match state.bookmarks_for(&client) {
        Ok(bookmarks) => bookmarks.count().await,
        Err(err) => Err(err),
    };
    match count {
        Ok(count) => count.to_string().into_response(),
        Err(err) => server_error(err.into()),
    }
}

/// Server-sent `bookmarks` events for this visitor, one per change from any of their views.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let bookmarks = state
        .bookmarks_for(&client)
        .map_err(|err| server_error(err.into()))?;
    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });
    let changes = stream::unfold(bookmarks.subscribe(), |mut events| async move {
        let ids = events.next().await?;
        let payload = json!({ "count": ids.len(), "ids": ids });
        Some((
            Ok::<_, Infallible>(Event::default().event("bookmarks").data(payload.to_string())),
            events,
        ))
    });
    Ok(Sse::new(connected.chain(changes)).keep_alive(KeepAlive::default()))
}
