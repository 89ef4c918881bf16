use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::{debug, error, info, warn};
use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;

use crate::models::comment::{validate_comment_text, Comment, NewComment};
use crate::models::group::{Group, NewGroup};
use crate::models::post::{validate_post_text, NewPost, Post, PostChanges, PostDetail};
use crate::models::user::{validate_username, User};
use crate::repositories::{ContentStore, PostQuery, RepoError};
use crate::services::media_service::{MediaError, MediaStorage, UploadedImage};
use crate::services::paginator::{Page, Paginator, POSTS_ON_PAGE};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("only the author can change this post")]
    Forbidden,
    #[error("media error: {0}")]
    Media(MediaError),
    #[error("storage error: {0}")]
    Store(#[from] RepoError),
}

impl ContentError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ContentError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<MediaError> for ContentError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Io(_) => ContentError::Media(e),
            other => ContentError::validation("image", other.to_string()),
        }
    }
}

impl ResponseError for ContentError {
    fn status_code(&self) -> StatusCode {
        match self {
            ContentError::Validation { .. } => StatusCode::BAD_REQUEST,
            ContentError::NotFound(_) => StatusCode::NOT_FOUND,
            ContentError::Forbidden => StatusCode::FORBIDDEN,
            ContentError::Media(_) | ContentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(serde_json::json!({
            "status": "error",
            "message": message,
            "data": null,
        }))
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

/// Upper bound on cached index pages.
const INDEX_CACHE_PAGES: u64 = 1_000;

/// Restriction applied to a post listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    All,
    GroupSlug(String),
    AuthorUsername(String),
    FollowedBy(i64),
}

/// Submitted post form. `image: None` on edit keeps the current image.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<UploadedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfilePage {
    pub author: User,
    pub posts_count: u64,
    pub following: bool,
    pub page: Page<Post>,
}

/// Posts, comments, groups and follows. Callers pass the acting user's id
/// explicitly; nothing here reads request state.
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn ContentStore>,
    media: MediaStorage,
    index_cache: Cache<u64, Page<Post>>,
    page_size: u64,
}

impl ContentService {
    pub fn new(store: Arc<dyn ContentStore>, media: MediaStorage, index_ttl: Duration) -> Self {
        Self {
            store,
            media,
            index_cache: Cache::builder()
                .max_capacity(INDEX_CACHE_PAGES)
                .time_to_live(index_ttl)
                .build(),
            page_size: POSTS_ON_PAGE,
        }
    }

    pub fn media(&self) -> &MediaStorage {
        &self.media
    }

    async fn paginate(&self, query: PostQuery<'_>, page: u64) -> ContentResult<Page<Post>> {
        let count = self.store.count_posts(query).await?;
        let paginator = Paginator::new(count, self.page_size);
        let items = self
            .store
            .list_posts(query, paginator.per_page(), paginator.offset(page))
            .await?;
        Ok(paginator.page(page, items))
    }

    /// Newest-first listing. Unknown slugs or usernames give an empty page.
    pub async fn list_posts(&self, filter: &ListFilter, page: u64) -> ContentResult<Page<Post>> {
        let query = match filter {
            ListFilter::All => PostQuery::All,
            ListFilter::GroupSlug(slug) => PostQuery::GroupSlug(slug),
            ListFilter::AuthorUsername(username) => PostQuery::AuthorUsername(username),
            ListFilter::FollowedBy(user_id) => PostQuery::FollowedBy(*user_id),
        };
        self.paginate(query, page).await
    }

    /// Unfiltered listing served from the index cache when fresh. Entries are
    /// keyed by the page number actually shown, so out-of-range requests
    /// never add keys of their own.
    pub async fn index_page(&self, page: u64) -> ContentResult<Page<Post>> {
        if let Some(cached) = self.index_cache.get(&page).await {
            debug!("Index page {} served from cache", page);
            return Ok(cached);
        }
        let fresh = self.paginate(PostQuery::All, page).await?;
        self.index_cache.insert(fresh.number, fresh.clone()).await;
        Ok(fresh)
    }

    pub fn clear_index_cache(&self) {
        self.index_cache.invalidate_all();
    }

    #[cfg(test)]
    async fn cached_index_pages(&self) -> u64 {
        self.index_cache.run_pending_tasks().await;
        self.index_cache.entry_count()
    }

    pub async fn list_followed_posts(&self, follower_id: i64, page: u64) -> ContentResult<Page<Post>> {
        self.list_posts(&ListFilter::FollowedBy(follower_id), page).await
    }

    pub async fn group_page(&self, slug: &str, page: u64) -> ContentResult<(Group, Page<Post>)> {
        let group = self
            .store
            .find_group_by_slug(slug)
            .await?
            .ok_or(ContentError::NotFound("group"))?;
        let posts = self.paginate(PostQuery::Group(group.id), page).await?;
        Ok((group, posts))
    }

    pub async fn find_author(&self, username: &str) -> ContentResult<User> {
        self.store
            .find_user_by_username(username)
            .await?
            .ok_or(ContentError::NotFound("author"))
    }

    pub async fn profile_page(
        &self,
        username: &str,
        viewer_id: Option<i64>,
        page: u64,
    ) -> ContentResult<ProfilePage> {
        let author = self.find_author(username).await?;
        let posts = self.paginate(PostQuery::Author(author.id), page).await?;
        let following = match viewer_id {
            Some(viewer_id) => self.store.is_following(viewer_id, author.id).await?,
            None => false,
        };
        Ok(ProfilePage {
            posts_count: posts.total_count,
            author,
            following,
            page: posts,
        })
    }

    pub async fn register_user(&self, username: &str) -> ContentResult<User> {
        let username = validate_username(username).map_err(|m| ContentError::validation("username", m))?;
        match self.store.create_user(&username).await {
            Ok(user) => Ok(user),
            Err(RepoError::Conflict(_)) => Err(ContentError::validation(
                "username",
                "A user with that username already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Mirrors the identity carried by a verified session token so that the
    /// caller can author posts and be followed.
    pub async fn sync_user(&self, user_id: i64, username: &str) -> ContentResult<User> {
        let username = validate_username(username).map_err(|m| ContentError::validation("username", m))?;
        let user = User { id: user_id, username };
        match self.store.upsert_user(&user).await {
            Ok(()) => Ok(user),
            Err(RepoError::Conflict(_)) => Err(ContentError::validation(
                "username",
                "A user with that username already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_groups(&self) -> ContentResult<Vec<Group>> {
        Ok(self.store.list_groups().await?)
    }

    pub async fn create_group(&self, group: &NewGroup) -> ContentResult<Group> {
        let group = group
            .validate()
            .map_err(|(field, message)| ContentError::validation(field, message))?;
        match self.store.create_group(&group).await {
            Ok(created) => {
                info!("Group {} created", created.slug);
                Ok(created)
            }
            Err(RepoError::Conflict(_)) => Err(ContentError::validation(
                "slug",
                "A group with this slug already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates every group whose slug is not taken yet; returns how many were added.
    pub async fn seed_groups(&self, groups: &[NewGroup]) -> ContentResult<usize> {
        let mut created = 0;
        for group in groups {
            match self.create_group(group).await {
                Ok(_) => created += 1,
                Err(ContentError::Validation { field: "slug", message }) => {
                    if self.store.find_group_by_slug(group.slug.trim()).await?.is_none() {
                        return Err(ContentError::Validation { field: "slug", message });
                    }
                    debug!("Group {} already present", group.slug);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    pub async fn get_post(&self, post_id: i64) -> ContentResult<PostDetail> {
        let post = self
            .store
            .find_post(post_id)
            .await?
            .ok_or(ContentError::NotFound("post"))?;
        let author_posts_count = self.store.count_posts(PostQuery::Author(post.author_id)).await?;
        let comments = self.store.list_comments(post.id).await?;
        Ok(PostDetail {
            post,
            author_posts_count,
            comments_count: comments.len(),
            comments,
        })
    }

    async fn clean_post_input(&self, input: &PostInput) -> ContentResult<(String, Option<i64>)> {
        let text = validate_post_text(&input.text).map_err(|m| ContentError::validation("text", m))?;
        if let Some(group_id) = input.group_id {
            if self.store.find_group(group_id).await?.is_none() {
                return Err(ContentError::validation(
                    "group",
                    "Select a valid choice. That choice is not one of the available choices.",
                ));
            }
        }
        Ok((text, input.group_id))
    }

    async fn store_image(&self, image: Option<&UploadedImage>) -> ContentResult<Option<String>> {
        match image {
            Some(image) => Ok(Some(self.media.save_post_image(image).await?)),
            None => Ok(None),
        }
    }

    pub async fn create_post(&self, author_id: i64, input: PostInput) -> ContentResult<Post> {
        let (text, group_id) = self.clean_post_input(&input).await?;
        let image = self.store_image(input.image.as_ref()).await?;

        let new_post = NewPost {
            author_id,
            text,
            group_id,
            image: image.clone(),
        };
        match self.store.insert_post(&new_post).await {
            Ok(post) => {
                info!("Post {} created by user {}", post.id, author_id);
                Ok(post)
            }
            Err(e) => {
                if let Some(path) = image {
                    self.media.remove(&path).await;
                }
                Err(e.into())
            }
        }
    }

    /// Author-only edit. `pub_date` is preserved; concurrent edits are last-write-wins.
    pub async fn edit_post(&self, post_id: i64, actor_id: i64, input: PostInput) -> ContentResult<Post> {
        let current = self
            .store
            .find_post(post_id)
            .await?
            .ok_or(ContentError::NotFound("post"))?;
        if current.author_id != actor_id {
            warn!("User {} tried to edit post {} of user {}", actor_id, post_id, current.author_id);
            return Err(ContentError::Forbidden);
        }

        let (text, group_id) = self.clean_post_input(&input).await?;
        let image = self.store_image(input.image.as_ref()).await?;
        let changes = PostChanges {
            text,
            group_id,
            image: image.clone(),
        };

        let updated = match self.store.update_post(post_id, &changes).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                if let Some(path) = image {
                    self.media.remove(&path).await;
                }
                return Err(ContentError::NotFound("post"));
            }
            Err(e) => {
                if let Some(path) = image {
                    self.media.remove(&path).await;
                }
                return Err(e.into());
            }
        };

        if image.is_some() {
            if let Some(old) = current.image.as_deref() {
                self.media.remove(old).await;
            }
        }
        info!("Post {} edited by its author", post_id);
        Ok(updated)
    }

    /// Author-only delete. The index cache is left alone.
    pub async fn delete_post(&self, post_id: i64, actor_id: i64) -> ContentResult<()> {
        let post = self
            .store
            .find_post(post_id)
            .await?
            .ok_or(ContentError::NotFound("post"))?;
        if post.author_id != actor_id {
            warn!("User {} tried to delete post {} of user {}", actor_id, post_id, post.author_id);
            return Err(ContentError::Forbidden);
        }
        if self.store.delete_post(post_id).await? {
            if let Some(image) = post.image.as_deref() {
                self.media.remove(image).await;
            }
            info!("Post {} deleted", post_id);
        }
        Ok(())
    }

    pub async fn add_comment(&self, post_id: i64, author_id: i64, text: &str) -> ContentResult<Comment> {
        if self.store.find_post(post_id).await?.is_none() {
            return Err(ContentError::NotFound("post"));
        }
        let text = validate_comment_text(text).map_err(|m| ContentError::validation("text", m))?;
        let comment = self
            .store
            .insert_comment(&NewComment {
                post_id,
                author_id,
                text,
            })
            .await?;
        debug!("Comment {} added to post {}", comment.id, post_id);
        Ok(comment)
    }

    /// Idempotent. Returns whether a new edge was created; following oneself
    /// is silently ignored.
    pub async fn follow(&self, follower_id: i64, author_id: i64) -> ContentResult<bool> {
        if follower_id == author_id {
            debug!("User {} tried to follow themselves", follower_id);
            return Ok(false);
        }
        let created = self.store.insert_follow(follower_id, author_id).await?;
        if created.is_some() {
            info!("User {} now follows user {}", follower_id, author_id);
        }
        Ok(created.is_some())
    }

    pub async fn unfollow(&self, follower_id: i64, author_id: i64) -> ContentResult<bool> {
        let removed = self.store.delete_follow(follower_id, author_id).await?;
        if removed {
            info!("User {} unfollowed user {}", follower_id, author_id);
        }
        Ok(removed)
    }

    pub async fn follow_by_username(&self, follower_id: i64, username: &str) -> ContentResult<User> {
        let author = self.find_author(username).await?;
        self.follow(follower_id, author.id).await?;
        Ok(author)
    }

    pub async fn unfollow_by_username(&self, follower_id: i64, username: &str) -> ContentResult<User> {
        let author = self.find_author(username).await?;
        self.unfollow(follower_id, author.id).await?;
        Ok(author)
    }
}
