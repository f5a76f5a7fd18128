use std::sync::Arc;

use crate::api::{
    self, ApiError, AuthPayload, Comment, FeedPage, FeedScope, Post, PostDraft, Registration,
};

pub trait FeedService: Send + Sync {
    fn list_posts(&self, scope: FeedScope, page: u32, limit: u32) -> Result<FeedPage, ApiError>;
}

pub trait PostService: Send + Sync {
    fn get_post(&self, id: u64) -> Result<Post, ApiError>;
    fn create_post(&self, draft: &PostDraft, token: &str) -> Result<Post, ApiError>;
    fn update_post(&self, id: u64, draft: &PostDraft, token: &str) -> Result<Post, ApiError>;
    fn delete_post(&self, id: u64, token: &str) -> Result<(), ApiError>;
}

pub trait CommentService: Send + Sync {
    fn add_comment(&self, post_id: u64, body: &str, token: &str) -> Result<Comment, ApiError>;
}

pub trait AuthService: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<AuthPayload, ApiError>;
    fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError>;
}

pub struct TarmeezFeedService {
    client: Arc<api::Client>,
}

impl TarmeezFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for TarmeezFeedService {
    fn list_posts(&self, scope: FeedScope, page: u32, limit: u32) -> Result<FeedPage, ApiError> {
        self.client.list_posts(scope, page, limit)
    }
}

pub struct TarmeezPostService {
    client: Arc<api::Client>,
}

impl TarmeezPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for TarmeezPostService {
    fn get_post(&self, id: u64) -> Result<Post, ApiError> {
        self.client.get_post(id)
    }

    fn create_post(&self, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
        self.client.create_post(draft, token)
    }

    fn update_post(&self, id: u64, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
        self.client.update_post(id, draft, token)
    }

    fn delete_post(&self, id: u64, token: &str) -> Result<(), ApiError> {
        self.client.delete_post(id, token)
    }
}

pub struct TarmeezCommentService {
    client: Arc<api::Client>,
}

impl TarmeezCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for TarmeezCommentService {
    fn add_comment(&self, post_id: u64, body: &str, token: &str) -> Result<Comment, ApiError> {
        self.client.add_comment(post_id, body, token)
    }
}

pub struct TarmeezAuthService {
    client: Arc<api::Client>,
}

impl TarmeezAuthService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AuthService for TarmeezAuthService {
    fn login(&self, username: &str, password: &str) -> Result<AuthPayload, ApiError> {
        self.client.login(username, password)
    }

    fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError> {
        self.client.register(registration)
    }
}

pub mod mock {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::Value;

    use super::*;
    use crate::api::{Tag, User};

    pub fn user(id: u64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            profile_image: Value::Null,
        }
    }

    pub fn post(id: u64, author: User) -> Post {
        Post {
            id,
            title: format!("post {id}"),
            body: "sample body".into(),
            image: Value::String(format!("https://example.com/{id}.jpg")),
            author,
            created_at: "1 day ago".into(),
            comments_count: 0,
            comments: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn page(ids: &[u64], current_page: u32, last_page: u32) -> FeedPage {
        FeedPage {
            posts: ids
                .iter()
                .map(|id| post(*id, user(100 + id, "author")))
                .collect(),
            current_page,
            last_page,
        }
    }

    /// Replays queued responses in order and counts every call.
    #[derive(Default)]
    pub struct MockFeedService {
        responses: Mutex<VecDeque<Result<FeedPage, ApiError>>>,
        calls: AtomicUsize,
    }

    impl MockFeedService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, response: Result<FeedPage, ApiError>) {
            self.responses.lock().push_back(response);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FeedService for MockFeedService {
        fn list_posts(
            &self,
            _scope: FeedScope,
            page: u32,
            _limit: u32,
        ) -> Result<FeedPage, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().pop_front().unwrap_or_else(|| {
                Ok(FeedPage {
                    posts: Vec::new(),
                    current_page: page,
                    last_page: 1,
                })
            })
        }
    }

    #[derive(Default)]
    pub struct MockPostService {
        posts: Mutex<HashMap<u64, Post>>,
        failing: Mutex<HashSet<u64>>,
        detail_calls: AtomicUsize,
    }

    impl MockPostService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, post: Post) {
            self.posts.lock().insert(post.id, post);
        }

        pub fn insert_with_tags(&self, id: u64, tags: &[&str]) {
            let mut entry = post(id, user(1, "author"));
            entry.tags = tags
                .iter()
                .enumerate()
                .map(|(i, name)| Tag {
                    id: i as u64 + 1,
                    name: name.to_string(),
                })
                .collect();
            self.insert(entry);
        }

        pub fn fail_on(&self, id: u64) {
            self.failing.lock().insert(id);
        }

        pub fn detail_calls(&self) -> usize {
            self.detail_calls.load(Ordering::SeqCst)
        }
    }

    impl PostService for MockPostService {
        fn get_post(&self, id: u64) -> Result<Post, ApiError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().contains(&id) {
                return Err(ApiError::Server { status: 500 });
            }
            self.posts
                .lock()
                .get(&id)
                .cloned()
                .ok_or(ApiError::NotFound)
        }

        fn create_post(&self, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
            if token.trim().is_empty() {
                return Err(ApiError::MissingToken);
            }
            let mut created = post(1, user(1, "author"));
            created.title = draft.title.clone();
            created.body = draft.body.clone();
            Ok(created)
        }

        fn update_post(&self, id: u64, draft: &PostDraft, token: &str) -> Result<Post, ApiError> {
            if token.trim().is_empty() {
                return Err(ApiError::MissingToken);
            }
            let mut updated = post(id, user(1, "author"));
            updated.title = draft.title.clone();
            updated.body = draft.body.clone();
            Ok(updated)
        }

        fn delete_post(&self, id: u64, token: &str) -> Result<(), ApiError> {
            if token.trim().is_empty() {
                return Err(ApiError::MissingToken);
            }
            self.posts.lock().remove(&id);
            Ok(())
        }
    }
}
