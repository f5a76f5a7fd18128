use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::{multipart, Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://tarmeezacademy.com/api/v1/";

/// Images above this size are rejected before any request is issued.
pub const MAX_IMAGE_SIZE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Validation(String),
    #[error("server error {status}")]
    Server { status: u16 },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("login required")]
    MissingToken,
    #[error("image exceeds {MAX_IMAGE_SIZE_BYTES} bytes")]
    ImageTooLarge,
}

impl ApiError {
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error: No response received from server.".into(),
            ApiError::Unauthorized => {
                "Authorization Failed: Please check your API token.".into()
            }
            ApiError::NotFound => "The requested item could not be found.".into(),
            ApiError::PayloadTooLarge => {
                "Image too large. Please upload a smaller image.".into()
            }
            ApiError::Validation(message) => message.clone(),
            ApiError::Server { status } => format!("Server error: {status}"),
            ApiError::Decode(_) => "Unexpected response from server.".into(),
            ApiError::MissingToken => "Please log in first.".into(),
            ApiError::ImageTooLarge => {
                "Image size exceeds the maximum limit of 5MB. Please choose a smaller image."
                    .into()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedScope {
    Global,
    User(u64),
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("tarmeez client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        // The join in url() needs the trailing slash to keep the /api/v1 prefix.
        let base = if base.ends_with('/') {
            base
        } else {
            format!("{base}/")
        };
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn list_posts(
        &self,
        scope: FeedScope,
        page: u32,
        limit: u32,
    ) -> Result<FeedPage, ApiError> {
        let path = match scope {
            FeedScope::Global => "posts".to_string(),
            FeedScope::User(id) => format!("users/{id}/posts"),
        };
        let mut url = self.url(&path)?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("page", &page.to_string());

        let result = self.execute(self.http.get(url));
        let resp = match result {
            Ok(resp) => resp,
            // A user with no posts yet is an empty page, not an error.
            Err(ApiError::NotFound) if matches!(scope, FeedScope::User(_)) => {
                return Ok(FeedPage {
                    posts: Vec::new(),
                    current_page: page,
                    last_page: 1,
                });
            }
            Err(err) => return Err(err),
        };

        let envelope: PageEnvelope = decode(resp)?;
        Ok(FeedPage {
            posts: envelope.data,
            current_page: page,
            last_page: envelope.meta.last_page,
        })
    }

    pub fn get_post(&self, id: u64) -> Result<Post, ApiError> {
        let url = self.url(&format!("posts/{id}"))?;
        let resp = self.execute(self.http.get(url))?;
        let envelope: PostEnvelope = decode(resp)?;
        Ok(envelope.data)
    }

    pub fn create_post(&self, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
        let token = require_token(token)?;
        let form = draft.to_form(false)?;
        let url = self.url("posts")?;
        let resp = self.execute(self.http.post(url).bearer_auth(token).multipart(form))?;
        let envelope: PostEnvelope = decode(resp)?;
        Ok(envelope.data)
    }

    pub fn update_post(&self, id: u64, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
        let token = require_token(token)?;
        // Laravel backends reject native PUT with multipart; POST + _method override.
        let form = draft.to_form(true)?;
        let url = self.url(&format!("posts/{id}"))?;
        let resp = self.execute(self.http.post(url).bearer_auth(token).multipart(form))?;
        let envelope: PostEnvelope = decode(resp)?;
        Ok(envelope.data)
    }

    pub fn delete_post(&self, id: u64, token: &str) -> Result<(), ApiError> {
        let token = require_token(token)?;
        let url = self.url(&format!("posts/{id}"))?;
        self.execute(self.http.delete(url).bearer_auth(token))?;
        Ok(())
    }

    pub fn add_comment(&self, post_id: u64, body: &str, token: &str) -> Result<Comment, ApiError> {
        let token = require_token(token)?;
        let url = self.url(&format!("posts/{post_id}/comments"))?;
        let payload = json!({ "body": body, "postId": post_id });
        let resp = self.execute(
            self.http
                .post(url)
                .bearer_auth(token)
                .header(CONTENT_TYPE, "application/json")
                .json(&payload),
        )?;
        let envelope: CommentEnvelope = decode(resp)?;
        Ok(envelope.data)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AuthPayload, ApiError> {
        let url = self.url("login")?;
        let payload = json!({ "username": username, "password": password });
        let resp = self.execute(self.http.post(url).json(&payload))?;
        decode(resp)
    }

    pub fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError> {
        let url = self.url("register")?;
        let mut form = multipart::Form::new()
            .text("username", registration.username.clone())
            .text("password", registration.password.clone())
            .text("name", registration.name.clone())
            .text("email", registration.email.clone());
        if let Some(image) = &registration.image {
            form = form.part("image", image.to_part()?);
        }
        let resp = self.execute(self.http.post(url).multipart(form))?;
        decode(resp)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Validation(format!("invalid request path: {err}")))
    }

    fn execute(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = req.header(USER_AGENT, self.user_agent.clone()).send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(map_status(status, &body))
    }
}

fn require_token(token: &str) -> Result<&str, ApiError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::MissingToken);
    }
    Ok(token)
}

fn map_status(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
        status if status.is_client_error() => {
            let message = extract_message(body)
                .unwrap_or_else(|| format!("request rejected ({})", status.as_u16()));
            ApiError::Validation(message)
        }
        status => ApiError::Server {
            status: status.as_u16(),
        },
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let body = resp.text()?;
    Ok(serde_json::from_str(&body)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    // The backend returns an empty array when a post carries no image.
    #[serde(default)]
    pub image: Value,
    pub author: User,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub username: String,
    // Placeholder accounts carry a non-string value here; keep it raw and
    // let the renderer decide on the fallback.
    #[serde(default)]
    pub profile_image: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    pub author: User,
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub current_page: u32,
    pub last_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub image: Option<ImageUpload>,
}

impl PostDraft {
    fn to_form(&self, method_override: bool) -> Result<multipart::Form, ApiError> {
        let mut form = multipart::Form::new()
            .text("title", self.title.clone())
            .text("body", self.body.clone());
        if let Some(image) = &self.image {
            form = form.part("image", image.to_part()?);
        }
        if method_override {
            form = form.text("_method", "PUT");
        }
        Ok(form)
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    fn to_part(&self) -> Result<multipart::Part, ApiError> {
        if self.bytes.len() > MAX_IMAGE_SIZE_BYTES {
            return Err(ApiError::ImageTooLarge);
        }
        Ok(multipart::Part::bytes(self.bytes.clone()).file_name(self.file_name.clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    data: Vec<Post>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct PostEnvelope {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct CommentEnvelope {
    data: Comment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_listing_envelope() {
        let body = r#"{
            "data": [
                {
                    "id": 7,
                    "title": "hello",
                    "body": "world",
                    "image": [],
                    "author": {"id": 3, "username": "sara", "profile_image": null},
                    "created_at": "2 days ago",
                    "comments_count": 4
                }
            ],
            "meta": {"current_page": 1, "last_page": 3, "total": 25}
        }"#;
        let envelope: PageEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].id, 7);
        assert_eq!(envelope.data[0].author.username, "sara");
        assert!(envelope.data[0].tags.is_empty());
        assert_eq!(envelope.meta.last_page, 3);
    }

    #[test]
    fn listing_without_meta_is_a_decode_error() {
        let body = r#"{"data": []}"#;
        let result: Result<PageEnvelope, _> = serde_json::from_str(body);
        assert!(result.is_err());
    }

    #[test]
    fn decodes_detail_envelope_with_comments_and_tags() {
        let body = r#"{
            "data": {
                "id": 9,
                "title": "t",
                "body": "b",
                "image": "https://example.com/p.jpg",
                "author": {"id": 1, "username": "omar", "profile_image": "https://example.com/a.jpg"},
                "created_at": "1 hour ago",
                "comments_count": 1,
                "comments": [
                    {"id": 11, "body": "nice", "author": {"id": 2, "username": "lina", "profile_image": 7}}
                ],
                "tags": [{"id": 1, "name": "news"}]
            }
        }"#;
        let envelope: PostEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.comments.len(), 1);
        assert_eq!(envelope.data.tags[0].name, "news");
    }

    #[test]
    fn maps_error_statuses() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, ""),
            ApiError::NotFound
        ));
        assert!(matches!(
            map_status(StatusCode::PAYLOAD_TOO_LARGE, ""),
            ApiError::PayloadTooLarge
        ));
        match map_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message": "The title field is required."}"#) {
            ApiError::Validation(message) => {
                assert_eq!(message, "The title field is required.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::Server { status: 500 }
        ));
    }

    #[test]
    fn payload_too_large_has_dedicated_message() {
        let generic = ApiError::Server { status: 500 }.user_message();
        let too_large = ApiError::PayloadTooLarge.user_message();
        assert_ne!(generic, too_large);
        assert!(too_large.contains("smaller image"));
    }

    #[test]
    fn oversized_image_rejected_before_send() {
        let image = ImageUpload {
            file_name: "big.jpg".into(),
            bytes: vec![0u8; MAX_IMAGE_SIZE_BYTES + 1],
        };
        assert!(matches!(image.to_part(), Err(ApiError::ImageTooLarge)));
    }

    #[test]
    fn mutations_require_a_token() {
        assert!(matches!(require_token("  "), Err(ApiError::MissingToken)));
        assert_eq!(require_token(" abc ").unwrap(), "abc");
    }
}
