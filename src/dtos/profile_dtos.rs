use serde::Serialize;

use crate::models::post::Post;
use crate::models::user::User;
use crate::services::content_service::ProfilePage;
use crate::services::paginator::Page;

#[derive(Debug, Serialize)]
pub struct ProfileContext {
    pub author: User,
    pub posts_count: u64,
    pub following: bool,
    /// Hides the follow button on one's own profile.
    pub is_own_profile: bool,
    pub page_obj: Page<Post>,
}

impl ProfileContext {
    pub fn new(profile: ProfilePage, viewer_id: Option<i64>) -> Self {
        Self {
            is_own_profile: viewer_id == Some(profile.author.id),
            author: profile.author,
            posts_count: profile.posts_count,
            following: profile.following,
            page_obj: profile.page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AboutContext {
    pub title: &'static str,
    pub text: &'static str,
}
