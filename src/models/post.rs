use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::comment::Comment;

pub const POST_TEXT_MAX_CHARS: usize = 255;
/// Length of the text preview used when a post or comment is displayed.
pub const PREVIEW_CHARS: usize = 15;

/// Post row joined with its author's username and its group's slug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author_id: i64,
    pub author: String,
    pub group_id: Option<i64>,
    pub group_slug: Option<String>,
    pub image: Option<String>, // path relative to MEDIA_ROOT
}

impl std::fmt::Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&preview(&self.text))
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Fields an author may change. `image: None` keeps the current image.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Everything the detail page shows about a post.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub author_posts_count: u64,
    pub comments_count: usize,
    pub comments: Vec<Comment>,
}

/// Trims the text and checks it is present and at most 255 characters long.
pub fn validate_post_text(text: &str) -> Result<String, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("Text is required".to_string());
    }
    if text.chars().count() > POST_TEXT_MAX_CHARS {
        return Err(format!(
            "Text exceeds {} characters",
            POST_TEXT_MAX_CHARS
        ));
    }
    Ok(text.to_string())
}

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_of_255_chars_is_accepted() {
        let text = "я".repeat(POST_TEXT_MAX_CHARS);
        assert_eq!(validate_post_text(&text).unwrap(), text);
    }

    #[test]
    fn text_of_256_chars_is_rejected() {
        assert!(validate_post_text(&"a".repeat(POST_TEXT_MAX_CHARS + 1)).is_err());
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(validate_post_text("").is_err());
        assert!(validate_post_text(" \n\t ").is_err());
    }

    #[test]
    fn post_displays_first_fifteen_chars() {
        let post = Post {
            id: 1,
            text: "Testing the test post text".to_string(),
            pub_date: Utc::now(),
            author_id: 1,
            author: "user".to_string(),
            group_id: None,
            group_slug: None,
            image: None,
        };
        assert_eq!(post.to_string(), "Testing the tes");
    }
}
