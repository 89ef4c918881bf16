use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{ContentStore, PostQuery, RepoError, RepoResult};
use crate::models::comment::{Comment, NewComment};
use crate::models::follow::Follow;
use crate::models::group::{Group, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges};
use crate::models::user::User;

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    text: String,
    pub_date: chrono::DateTime<Utc>,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    groups: Vec<Group>,
    posts: Vec<PostRow>,
    comments: Vec<CommentRow>,
    follows: Vec<Follow>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username(&self, user_id: i64) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn to_post(&self, row: &PostRow) -> Post {
        Post {
            id: row.id,
            text: row.text.clone(),
            pub_date: row.pub_date,
            author_id: row.author_id,
            author: self.username(row.author_id),
            group_id: row.group_id,
            group_slug: row
                .group_id
                .and_then(|id| self.groups.iter().find(|g| g.id == id))
                .map(|g| g.slug.clone()),
            image: row.image.clone(),
        }
    }

    fn to_comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            author: self.username(row.author_id),
            text: row.text.clone(),
            created: row.created,
        }
    }

    fn matches(&self, row: &PostRow, query: PostQuery<'_>) -> bool {
        match query {
            PostQuery::All => true,
            PostQuery::Group(group_id) => row.group_id == Some(group_id),
            PostQuery::GroupSlug(slug) => row
                .group_id
                .is_some_and(|id| self.groups.iter().any(|g| g.id == id && g.slug == slug)),
            PostQuery::Author(author_id) => row.author_id == author_id,
            PostQuery::AuthorUsername(username) => self
                .users
                .iter()
                .any(|u| u.id == row.author_id && u.username == username),
            PostQuery::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|f| f.user_id == user_id && f.author_id == row.author_id),
        }
    }

    fn check_group_ref(&self, group_id: Option<i64>) -> RepoResult<()> {
        match group_id {
            Some(id) if !self.groups.iter().any(|g| g.id == id) => {
                Err(RepoError::Constraint(format!("group {} does not exist", id)))
            }
            _ => Ok(()),
        }
    }

    fn check_user_ref(&self, user_id: i64) -> RepoResult<()> {
        if self.users.iter().any(|u| u.id == user_id) {
            Ok(())
        } else {
            Err(RepoError::Constraint(format!("user {} does not exist", user_id)))
        }
    }
}

/// Volatile `ContentStore` keeping every table behind one mutex, so each
/// call is atomic the same way a single SQL statement is.
#[derive(Default)]
pub struct MemoryContentStore {
    tables: Mutex<Tables>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn create_user(&self, username: &str) -> RepoResult<User> {
        let mut t = self.lock();
        if t.users.iter().any(|u| u.username == username) {
            return Err(RepoError::Conflict(format!("user {}", username)));
        }
        let user = User {
            id: t.next_id(),
            username: username.to_string(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn upsert_user(&self, user: &User) -> RepoResult<()> {
        let mut t = self.lock();
        if t
            .users
            .iter()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(RepoError::Conflict(format!("user {}", user.username)));
        }
        match t.users.iter().position(|u| u.id == user.id) {
            Some(idx) => t.users[idx].username = user.username.clone(),
            None => {
                t.users.push(user.clone());
                t.next_id = t.next_id.max(user.id);
            }
        }
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_group(&self, group: &NewGroup) -> RepoResult<Group> {
        let mut t = self.lock();
        if t.groups.iter().any(|g| g.slug == group.slug) {
            return Err(RepoError::Conflict(format!("group {}", group.slug)));
        }
        let group = Group {
            id: t.next_id(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        t.groups.push(group.clone());
        Ok(group)
    }

    async fn find_group(&self, group_id: i64) -> RepoResult<Option<Group>> {
        Ok(self.lock().groups.iter().find(|g| g.id == group_id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> RepoResult<Option<Group>> {
        Ok(self.lock().groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn list_groups(&self) -> RepoResult<Vec<Group>> {
        let mut groups = self.lock().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn insert_post(&self, post: &NewPost) -> RepoResult<Post> {
        let mut t = self.lock();
        t.check_user_ref(post.author_id)?;
        t.check_group_ref(post.group_id)?;
        let row = PostRow {
            id: t.next_id(),
            text: post.text.clone(),
            pub_date: Utc::now(),
            author_id: post.author_id,
            group_id: post.group_id,
            image: post.image.clone(),
        };
        let created = t.to_post(&row);
        t.posts.push(row);
        Ok(created)
    }

    async fn find_post(&self, post_id: i64) -> RepoResult<Option<Post>> {
        let t = self.lock();
        Ok(t.posts.iter().find(|p| p.id == post_id).map(|p| t.to_post(p)))
    }

    async fn update_post(&self, post_id: i64, changes: &PostChanges) -> RepoResult<Option<Post>> {
        let mut t = self.lock();
        t.check_group_ref(changes.group_id)?;
        let Some(row) = t.posts.iter_mut().find(|p| p.id == post_id) else {
            return Ok(None);
        };
        row.text = changes.text.clone();
        row.group_id = changes.group_id;
        if let Some(image) = &changes.image {
            row.image = Some(image.clone());
        }
        let row = row.clone();
        Ok(Some(t.to_post(&row)))
    }

    async fn delete_post(&self, post_id: i64) -> RepoResult<bool> {
        let mut t = self.lock();
        let before = t.posts.len();
        t.posts.retain(|p| p.id != post_id);
        t.comments.retain(|c| c.post_id != post_id);
        Ok(t.posts.len() != before)
    }

    async fn count_posts(&self, query: PostQuery<'_>) -> RepoResult<u64> {
        let t = self.lock();
        Ok(t.posts.iter().filter(|p| t.matches(p, query)).count() as u64)
    }

    async fn list_posts(&self, query: PostQuery<'_>, limit: u64, offset: u64) -> RepoResult<Vec<Post>> {
        let t = self.lock();
        let mut rows: Vec<&PostRow> = t.posts.iter().filter(|p| t.matches(p, query)).collect();
        rows.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|p| t.to_post(p))
            .collect())
    }

    async fn insert_comment(&self, comment: &NewComment) -> RepoResult<Comment> {
        let mut t = self.lock();
        t.check_user_ref(comment.author_id)?;
        if !t.posts.iter().any(|p| p.id == comment.post_id) {
            return Err(RepoError::Constraint(format!(
                "post {} does not exist",
                comment.post_id
            )));
        }
        let row = CommentRow {
            id: t.next_id(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            text: comment.text.clone(),
            created: Utc::now(),
        };
        let created = t.to_comment(&row);
        t.comments.push(row);
        Ok(created)
    }

    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        let t = self.lock();
        let mut rows: Vec<&CommentRow> = t.comments.iter().filter(|c| c.post_id == post_id).collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(rows.into_iter().map(|c| t.to_comment(c)).collect())
    }

    async fn insert_follow(&self, user_id: i64, author_id: i64) -> RepoResult<Option<Follow>> {
        let mut t = self.lock();
        if user_id == author_id {
            return Err(RepoError::Constraint("no_self_follow".to_string()));
        }
        t.check_user_ref(user_id)?;
        t.check_user_ref(author_id)?;
        if t
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(None);
        }
        let follow = Follow {
            id: t.next_id(),
            user_id,
            author_id,
        };
        t.follows.push(follow.clone());
        Ok(Some(follow))
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> RepoResult<bool> {
        let mut t = self.lock();
        let before = t.follows.len();
        t.follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(t.follows.len() != before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> RepoResult<bool> {
        Ok(self
            .lock()
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }
}
