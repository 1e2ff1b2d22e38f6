#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use foro::config::{AuthConfig, Config};
use foro::db;
use foro::state::{AppState, DbPool};

pub const ADMIN_GROUP_ID: i64 = 4;
pub const MODERATOR_GROUP_ID: i64 = 3;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` pairs from every Set-Cookie header, joined for a Cookie header.
    pub fn cookies(&self) -> String {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }
}

/// A registered user with their session cookies.
pub struct Session {
    pub id: i64,
    pub username: String,
    pub cookie: String,
}

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub config: Config,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.database.path = Some(dir.path().join("test.db"));
        config.storage.path = Some(dir.path().join("uploads"));
        config.auth = AuthConfig {
            jwt_secret: Some("integration-test-secret".to_string()),
            bcrypt_cost: 4,
            ..AuthConfig::default()
        };
        std::fs::create_dir_all(config.avatars_path()).expect("Failed to create avatars dir");

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let router = foro::app(AppState::new(pool.clone(), config.clone()));
        Self {
            router,
            pool,
            config,
            dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, cookie).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), cookie).await
    }

    pub async fn put(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), cookie).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, None, cookie).await
    }

    pub async fn register(&self, username: &str) -> Session {
        let res = self
            .post(
                "/api/auth/register",
                serde_json::json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "secret123",
                }),
                None,
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);

        Session {
            id: res.body["user"]["id"].as_i64().expect("user id"),
            username: username.to_string(),
            cookie: res.cookies(),
        }
    }

    pub fn set_group(&self, user_id: i64, group_id: i64) {
        let conn = self.pool.get().expect("Failed to get connection");
        conn.execute(
            "UPDATE users SET user_group_id = ?1 WHERE id = ?2",
            params![group_id, user_id],
        )
        .expect("Failed to change group");
    }

    pub async fn register_admin(&self, username: &str) -> Session {
        let session = self.register(username).await;
        self.set_group(session.id, ADMIN_GROUP_ID);
        session
    }

    /// Opens a thread in the seeded category and returns its slug.
    pub async fn create_post(&self, session: &Session, title: &str) -> String {
        let res = self
            .post(
                "/api/categories/1/posts",
                serde_json::json!({ "title": title, "content": "Some content for the thread" }),
                Some(&session.cookie),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "create post failed: {}", res.body);
        res.body["slug"].as_str().expect("slug").to_string()
    }
}
