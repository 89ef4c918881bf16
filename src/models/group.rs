use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const GROUP_TITLE_MAX_CHARS: usize = 200;
pub const GROUP_SLUG_MAX_CHARS: usize = 50;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid slug pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl NewGroup {
    /// Returns the offending field and a message on failure.
    pub fn validate(&self) -> Result<NewGroup, (&'static str, String)> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(("title", "Title is required".to_string()));
        }
        if title.chars().count() > GROUP_TITLE_MAX_CHARS {
            return Err((
                "title",
                format!("Title must be at most {} characters", GROUP_TITLE_MAX_CHARS),
            ));
        }

        let slug = self.slug.trim();
        if !is_valid_slug(slug) {
            return Err((
                "slug",
                "Slug may contain only latin letters, digits, hyphens and underscores"
                    .to_string(),
            ));
        }
        if slug.chars().count() > GROUP_SLUG_MAX_CHARS {
            return Err((
                "slug",
                format!("Slug must be at most {} characters", GROUP_SLUG_MAX_CHARS),
            ));
        }

        Ok(NewGroup {
            title: title.to_string(),
            slug: slug.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_group(title: &str, slug: &str) -> NewGroup {
        NewGroup {
            title: title.to_string(),
            slug: slug.to_string(),
            description: " Test description ".to_string(),
        }
    }

    #[test]
    fn group_displays_its_title() {
        let group = Group {
            id: 1,
            title: "Test group".to_string(),
            slug: "test-slug".to_string(),
            description: String::new(),
        };
        assert_eq!(group.to_string(), "Test group");
    }

    #[test]
    fn slug_must_be_url_safe() {
        assert!(is_valid_slug("test-slug_2"));
        assert!(!is_valid_slug("test slug"));
        assert!(!is_valid_slug("тест"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn validate_trims_and_reports_field() {
        let cleaned = new_group(" Cats ", "cats").validate().unwrap();
        assert_eq!(cleaned.title, "Cats");
        assert_eq!(cleaned.description, "Test description");

        assert_eq!(new_group("", "cats").validate().unwrap_err().0, "title");
        assert_eq!(new_group("Cats", "c/a").validate().unwrap_err().0, "slug");
        let long_slug = "s".repeat(GROUP_SLUG_MAX_CHARS + 1);
        assert_eq!(new_group("Cats", &long_slug).validate().unwrap_err().0, "slug");
    }
}
