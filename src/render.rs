use serde_json::Value;

use crate::api::{Comment, Post, Tag};
use crate::session::Session;

/// Shown when an author has no usable profile image.
pub const DEFAULT_AVATAR: &str = "./profile-pics/1.jpg";

/// Everything the display surface needs for one post card. Built fresh on
/// every render so the capability flag always reflects the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
    pub id: u64,
    pub author_handle: String,
    pub avatar: String,
    pub image: String,
    pub created_at: String,
    pub title: String,
    pub body: String,
    pub comments_count: i64,
    pub tag_labels: Vec<String>,
    /// Gates the edit/delete affordances.
    pub can_modify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub author_handle: String,
    pub avatar: String,
    pub body: String,
}

pub fn post_view(post: &Post, tags: &[Tag], session: Option<&Session>) -> PostView {
    let can_modify = session.map_or(false, |session| session.user.id == post.author.id);
    PostView {
        id: post.id,
        author_handle: format!("@{}", post.author.username),
        avatar: avatar_reference(&post.author.profile_image),
        image: post.image.as_str().unwrap_or_default().to_string(),
        created_at: post.created_at.clone(),
        title: post.title.clone(),
        body: post.body.clone(),
        comments_count: post.comments_count,
        tag_labels: tags.iter().map(|tag| tag.name.clone()).collect(),
        can_modify,
    }
}

pub fn comment_view(comment: &Comment) -> CommentView {
    CommentView {
        author_handle: format!("@{}", comment.author.username),
        avatar: avatar_reference(&comment.author.profile_image),
        body: comment.body.clone(),
    }
}

/// The backend sends placeholder values that are not strings for accounts
/// without an avatar; anything but a non-empty string falls back.
pub fn avatar_reference(profile_image: &Value) -> String {
    match profile_image.as_str() {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => DEFAULT_AVATAR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::User;
    use crate::data::mock::{post, user};

    fn session_for(id: u64) -> Session {
        Session {
            token: "token".into(),
            user: user(id, "viewer"),
        }
    }

    #[test]
    fn can_modify_only_for_the_author() {
        let entry = post(1, user(7, "omar"));
        let tags: Vec<Tag> = Vec::new();

        let own = post_view(&entry, &tags, Some(&session_for(7)));
        assert!(own.can_modify);

        let other = post_view(&entry, &tags, Some(&session_for(8)));
        assert!(!other.can_modify);

        let anonymous = post_view(&entry, &tags, None);
        assert!(!anonymous.can_modify);
    }

    #[test]
    fn avatar_falls_back_unless_non_empty_string() {
        assert_eq!(avatar_reference(&Value::Null), DEFAULT_AVATAR);
        assert_eq!(avatar_reference(&json!(7)), DEFAULT_AVATAR);
        assert_eq!(avatar_reference(&json!([])), DEFAULT_AVATAR);
        assert_eq!(avatar_reference(&json!("")), DEFAULT_AVATAR);
        assert_eq!(
            avatar_reference(&json!("https://example.com/a.jpg")),
            "https://example.com/a.jpg"
        );
    }

    #[test]
    fn view_carries_handle_tags_and_counts() {
        let mut entry = post(3, user(2, "sara"));
        entry.comments_count = 5;
        let tags = vec![
            Tag {
                id: 1,
                name: "news".into(),
            },
            Tag {
                id: 2,
                name: "rust".into(),
            },
        ];

        let view = post_view(&entry, &tags, None);
        assert_eq!(view.author_handle, "@sara");
        assert_eq!(view.comments_count, 5);
        assert_eq!(view.tag_labels, vec!["news", "rust"]);
        assert_eq!(view.image, "https://example.com/3.jpg");
    }

    #[test]
    fn comment_view_uses_same_avatar_fallback() {
        let comment = Comment {
            id: 4,
            body: "well said".into(),
            author: User {
                id: 9,
                username: "lina".into(),
                profile_image: json!({}),
            },
        };
        let view = comment_view(&comment);
        assert_eq!(view.author_handle, "@lina");
        assert_eq!(view.avatar, DEFAULT_AVATAR);
        assert_eq!(view.body, "well said");
    }
}
