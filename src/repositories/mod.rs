pub mod memory_repository;
pub mod pg_repository;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::comment::{Comment, NewComment};
use crate::models::follow::Follow;
use crate::models::group::{Group, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges};
use crate::models::user::User;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Which posts a listing covers. Ordering is always newest first.
///
/// The slug and username variants resolve inside the listing query itself;
/// an unknown value simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostQuery<'a> {
    All,
    Group(i64),
    GroupSlug(&'a str),
    Author(i64),
    AuthorUsername(&'a str),
    /// Posts by every author the given user follows.
    FollowedBy(i64),
}

/// Persistence for users, groups, posts, comments and follow edges.
///
/// Implementations enforce the data invariants themselves: unique usernames,
/// slugs and follow pairs, no self-follow and cascade delete of a post's
/// comments.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_user(&self, username: &str) -> RepoResult<User>;
    /// Mirrors an externally issued identity, inserting it under its own id
    /// or renaming the existing row.
    async fn upsert_user(&self, user: &User) -> RepoResult<()>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    async fn create_group(&self, group: &NewGroup) -> RepoResult<Group>;
    async fn find_group(&self, group_id: i64) -> RepoResult<Option<Group>>;
    async fn find_group_by_slug(&self, slug: &str) -> RepoResult<Option<Group>>;
    async fn list_groups(&self) -> RepoResult<Vec<Group>>;

    async fn insert_post(&self, post: &NewPost) -> RepoResult<Post>;
    async fn find_post(&self, post_id: i64) -> RepoResult<Option<Post>>;
    /// Returns `None` when the post does not exist. `pub_date` is never touched.
    async fn update_post(&self, post_id: i64, changes: &PostChanges) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, post_id: i64) -> RepoResult<bool>;
    async fn count_posts(&self, query: PostQuery<'_>) -> RepoResult<u64>;
    async fn list_posts(&self, query: PostQuery<'_>, limit: u64, offset: u64) -> RepoResult<Vec<Post>>;

    async fn insert_comment(&self, comment: &NewComment) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>>;

    /// Inserts the edge atomically. `Ok(None)` when the pair already exists.
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> RepoResult<Option<Follow>>;
    async fn delete_follow(&self, user_id: i64, author_id: i64) -> RepoResult<bool>;
    async fn is_following(&self, user_id: i64, author_id: i64) -> RepoResult<bool>;
}
