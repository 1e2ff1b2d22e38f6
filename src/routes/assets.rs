use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;

use crate::state::AppState;

#[derive(Embed)]
#[folder = "public/"]
struct Pages;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { page("index.html") }))
        .route("/login", get(|| async { page("login.html") }))
        .route("/register", get(|| async { page("register.html") }))
        .route("/{*path}", get(serve))
}

pub async fn serve(Path(path): Path<String>) -> Response {
    page(&path)
}

fn page(path: &str) -> Response {
    match Pages::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            let cache = if mime.essence_str() == "text/html" {
                "no-cache"
            } else {
                "public, max-age=3600"
            };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, cache.to_string()),
                ],
                file.data.to_vec(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_pages_are_present() {
        for name in ["index.html", "login.html", "register.html", "auth.js", "site-config.js"] {
            assert!(Pages::get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        assert_eq!(page("nope.txt").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn javascript_gets_a_script_content_type() {
        let response = page("auth.js");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("javascript"));
    }
}
