use crate::page::STUDIO_INDEX_HTML;
use axum::response::Html;

pub async fn index() -> Html<&'static str> {
    Html(STUDIO_INDEX_HTML)
}
