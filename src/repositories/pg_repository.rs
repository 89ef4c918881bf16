use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use log::{debug, info};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use super::{schema, ContentStore, PostQuery, RepoError, RepoResult};
use crate::models::comment::{Comment, NewComment};
use crate::models::follow::Follow;
use crate::models::group::{Group, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges};
use crate::models::user::User;

const POST_COLUMNS: &str = "p.id, p.text, p.pub_date, p.author_id, u.username AS author_username, \
     p.group_id, g.slug AS group_slug, p.image";
const POST_JOINS: &str =
    "JOIN users u ON u.id = p.author_id LEFT JOIN post_groups g ON g.id = p.group_id";
const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, u.username AS author_username, c.text, c.created";

/// `ContentStore` backed by PostgreSQL through a deadpool connection pool.
#[derive(Clone)]
pub struct PgContentStore {
    pool: Pool,
}

impl PgContentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates missing tables, constraints and indexes.
    pub async fn migrate(&self) -> RepoResult<()> {
        let client = self.client().await?;
        client.batch_execute(schema::SCHEMA).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    async fn client(&self) -> RepoResult<Object> {
        Ok(self.pool.get().await?)
    }
}

fn map_db_error(err: tokio_postgres::Error, what: &str) -> RepoError {
    match err.code() {
        Some(code) if code == &SqlState::UNIQUE_VIOLATION => RepoError::Conflict(what.to_string()),
        Some(code)
            if code == &SqlState::CHECK_VIOLATION || code == &SqlState::FOREIGN_KEY_VIOLATION =>
        {
            RepoError::Constraint(format!("{}: {}", what, err))
        }
        _ => RepoError::Postgres(err),
    }
}

fn user_from_row(row: &Row) -> Result<User, tokio_postgres::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
    })
}

fn group_from_row(row: &Row) -> Result<Group, tokio_postgres::Error> {
    Ok(Group {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
    })
}

fn post_from_row(row: &Row) -> Result<Post, tokio_postgres::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        pub_date: row.try_get("pub_date")?,
        author_id: row.try_get("author_id")?,
        author: row.try_get("author_username")?,
        group_id: row.try_get("group_id")?,
        group_slug: row.try_get("group_slug")?,
        image: row.try_get("image")?,
    })
}

fn comment_from_row(row: &Row) -> Result<Comment, tokio_postgres::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        author: row.try_get("author_username")?,
        text: row.try_get("text")?,
        created: row.try_get("created")?,
    })
}

/// Appends the filter argument to `params` and returns the matching predicate.
/// Expects `POST_JOINS` in the statement for the slug and username variants.
fn post_predicate<'a>(query: &'a PostQuery<'_>, params: &mut Vec<&'a (dyn ToSql + Sync)>) -> String {
    match query {
        PostQuery::All => "TRUE".to_string(),
        PostQuery::Group(group_id) => {
            params.push(group_id);
            format!("p.group_id = ${}", params.len())
        }
        PostQuery::GroupSlug(slug) => {
            params.push(slug);
            format!("g.slug = ${}", params.len())
        }
        PostQuery::Author(author_id) => {
            params.push(author_id);
            format!("p.author_id = ${}", params.len())
        }
        PostQuery::AuthorUsername(username) => {
            params.push(username);
            format!("u.username = ${}", params.len())
        }
        PostQuery::FollowedBy(user_id) => {
            params.push(user_id);
            format!(
                "p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ${})",
                params.len()
            )
        }
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn create_user(&self, username: &str) -> RepoResult<User> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO users (username) VALUES ($1) RETURNING id, username",
                &[&username],
            )
            .await
            .map_err(|e| map_db_error(e, &format!("user {}", username)))?;
        Ok(user_from_row(&row)?)
    }

    async fn upsert_user(&self, user: &User) -> RepoResult<()> {
        let client = self.client().await?;
        let changed = client
            .execute(
                "INSERT INTO users (id, username) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username \
                 WHERE users.username <> EXCLUDED.username",
                &[&user.id, &user.username],
            )
            .await
            .map_err(|e| map_db_error(e, &format!("user {}", user.username)))?;
        if changed > 0 {
            // keep locally registered ids clear of mirrored ones
            client
                .execute(
                    "SELECT setval(pg_get_serial_sequence('users', 'id'), \
                     GREATEST((SELECT MAX(id) FROM users), 1))",
                    &[],
                )
                .await?;
            debug!("Mirrored user {} ({})", user.username, user.id);
        }
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, username FROM users WHERE username = $1",
                &[&username],
            )
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn create_group(&self, group: &NewGroup) -> RepoResult<Group> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO post_groups (title, slug, description) VALUES ($1, $2, $3) \
                 RETURNING id, title, slug, description",
                &[&group.title, &group.slug, &group.description],
            )
            .await
            .map_err(|e| map_db_error(e, &format!("group {}", group.slug)))?;
        Ok(group_from_row(&row)?)
    }

    async fn find_group(&self, group_id: i64) -> RepoResult<Option<Group>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, title, slug, description FROM post_groups WHERE id = $1",
                &[&group_id],
            )
            .await?;
        Ok(row.as_ref().map(group_from_row).transpose()?)
    }

    async fn find_group_by_slug(&self, slug: &str) -> RepoResult<Option<Group>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, title, slug, description FROM post_groups WHERE slug = $1",
                &[&slug],
            )
            .await?;
        Ok(row.as_ref().map(group_from_row).transpose()?)
    }

    async fn list_groups(&self) -> RepoResult<Vec<Group>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, title, slug, description FROM post_groups ORDER BY title, id",
                &[],
            )
            .await?;
        Ok(rows.iter().map(group_from_row).collect::<Result<_, _>>()?)
    }

    async fn insert_post(&self, post: &NewPost) -> RepoResult<Post> {
        let client = self.client().await?;
        let sql = format!(
            "WITH p AS (INSERT INTO posts (author_id, text, group_id, image) \
             VALUES ($1, $2, $3, $4) RETURNING *) \
             SELECT {} FROM p {}",
            POST_COLUMNS, POST_JOINS
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[&post.author_id, &post.text, &post.group_id, &post.image],
            )
            .await
            .map_err(|e| map_db_error(e, "post"))?;
        Ok(post_from_row(&row)?)
    }

    async fn find_post(&self, post_id: i64) -> RepoResult<Option<Post>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM posts p {} WHERE p.id = $1",
            POST_COLUMNS, POST_JOINS
        );
        let row = client.query_opt(sql.as_str(), &[&post_id]).await?;
        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn update_post(&self, post_id: i64, changes: &PostChanges) -> RepoResult<Option<Post>> {
        let client = self.client().await?;
        let sql = format!(
            "WITH p AS (UPDATE posts SET text = $2, group_id = $3, image = COALESCE($4, image) \
             WHERE id = $1 RETURNING *) \
             SELECT {} FROM p {}",
            POST_COLUMNS, POST_JOINS
        );
        let row = client
            .query_opt(
                sql.as_str(),
                &[&post_id, &changes.text, &changes.group_id, &changes.image],
            )
            .await
            .map_err(|e| map_db_error(e, "post"))?;
        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn delete_post(&self, post_id: i64) -> RepoResult<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute("DELETE FROM posts WHERE id = $1", &[&post_id])
            .await?;
        Ok(deleted > 0)
    }

    async fn count_posts(&self, query: PostQuery<'_>) -> RepoResult<u64> {
        let client = self.client().await?;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let predicate = post_predicate(&query, &mut params);
        let sql = format!("SELECT COUNT(*) FROM posts p {} WHERE {}", POST_JOINS, predicate);
        let row = client.query_one(sql.as_str(), &params).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn list_posts(&self, query: PostQuery<'_>, limit: u64, offset: u64) -> RepoResult<Vec<Post>> {
        let client = self.client().await?;
        let limit = to_sql_int(limit);
        let offset = to_sql_int(offset);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let predicate = post_predicate(&query, &mut params);
        params.push(&limit);
        let limit_idx = params.len();
        params.push(&offset);
        let offset_idx = params.len();

        let sql = format!(
            "SELECT {} FROM posts p {} WHERE {} \
             ORDER BY p.pub_date DESC, p.id DESC LIMIT ${} OFFSET ${}",
            POST_COLUMNS, POST_JOINS, predicate, limit_idx, offset_idx
        );
        debug!("Listing posts: {:?} limit={} offset={}", query, limit, offset);

        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(post_from_row).collect::<Result<_, _>>()?)
    }

    async fn insert_comment(&self, comment: &NewComment) -> RepoResult<Comment> {
        let client = self.client().await?;
        let sql = format!(
            "WITH c AS (INSERT INTO comments (post_id, author_id, text) \
             VALUES ($1, $2, $3) RETURNING *) \
             SELECT {} FROM c JOIN users u ON u.id = c.author_id",
            COMMENT_COLUMNS
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[&comment.post_id, &comment.author_id, &comment.text],
            )
            .await
            .map_err(|e| map_db_error(e, "comment"))?;
        Ok(comment_from_row(&row)?)
    }

    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM comments c JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = $1 ORDER BY c.created, c.id",
            COMMENT_COLUMNS
        );
        let rows = client.query(sql.as_str(), &[&post_id]).await?;
        Ok(rows.iter().map(comment_from_row).collect::<Result<_, _>>()?)
    }

    async fn insert_follow(&self, user_id: i64, author_id: i64) -> RepoResult<Option<Follow>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id, author_id) DO NOTHING \
                 RETURNING id, user_id, author_id",
                &[&user_id, &author_id],
            )
            .await
            .map_err(|e| map_db_error(e, "follow"))?;

        match row {
            Some(row) => Ok(Some(Follow {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                author_id: row.try_get("author_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> RepoResult<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                "DELETE FROM follows WHERE user_id = $1 AND author_id = $2",
                &[&user_id, &author_id],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> RepoResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
                &[&user_id, &author_id],
            )
            .await?;
        Ok(row.try_get(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_numbers_placeholders_after_filter_argument() {
        let query = PostQuery::FollowedBy(7);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let predicate = post_predicate(&query, &mut params);
        assert_eq!(params.len(), 1);
        assert!(predicate.contains("f.user_id = $1"));

        let query = PostQuery::All;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        assert_eq!(post_predicate(&query, &mut params), "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn slug_and_username_filters_use_joined_columns() {
        let query = PostQuery::GroupSlug("test-slug");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        assert_eq!(post_predicate(&query, &mut params), "g.slug = $1");

        let query = PostQuery::AuthorUsername("leo");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        assert_eq!(post_predicate(&query, &mut params), "u.username = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn oversized_limits_saturate() {
        assert_eq!(to_sql_int(10), 10);
        assert_eq!(to_sql_int(u64::MAX), i64::MAX);
    }
}
