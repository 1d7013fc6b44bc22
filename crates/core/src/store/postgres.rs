//! PostgreSQL backend. All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`)
//! so building does not require a live database.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::info;

use super::{Connection, RawStoreError, RowSet, Statement, Store};
use crate::model::{ElementRecord, PageRecord, ProjectRecord, UserRecord};

impl From<sqlx::Error> for RawStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => RawStoreError::Database {
                code: db.code().map(|code| code.into_owned()),
                message: db.message().to_string(),
            },
            err @ (sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed) => RawStoreError::Connection(err.to_string()),
            other => RawStoreError::Other(other.to_string()),
        }
    }
}

/// Pooled PostgreSQL store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a bounded pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, min_connections, "connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn acquire(&self) -> Result<Box<dyn Connection>, RawStoreError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PooledConnection {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

struct PooledConnection {
    conn: Option<PoolConnection<Postgres>>,
    in_transaction: bool,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool;
        // the pool opens a replacement for a detached one.
        if self.in_transaction {
            if let Some(conn) = self.conn.take() {
                drop(conn.detach());
            }
        }
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn run(&mut self, statement: &Statement) -> Result<RowSet, RawStoreError> {
        let conn = self
            .conn
            .as_deref_mut()
            .ok_or_else(|| RawStoreError::Connection("connection already released".into()))?;
        let rows = match statement {
            Statement::Begin => {
                sqlx::query("BEGIN").execute(&mut *conn).await?;
                self.in_transaction = true;
                RowSet::empty()
            }
            Statement::Commit => {
                // The server ends the transaction block whether or not COMMIT succeeds.
                self.in_transaction = false;
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                RowSet::empty()
            }
            Statement::Rollback => {
                sqlx::query("ROLLBACK").execute(&mut *conn).await?;
                self.in_transaction = false;
                RowSet::empty()
            }
            Statement::Ping => {
                sqlx::query("SELECT 1").execute(&mut *conn).await?;
                RowSet::empty()
            }

            Statement::FindUser { user_id } => RowSet::from_rows(
                sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *conn)
                    .await?,
            ),
            Statement::FindUserByExternalId { external_id } => RowSet::from_rows(
                sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE external_id = $1")
                    .bind(external_id)
                    .fetch_optional(&mut *conn)
                    .await?,
            ),
            Statement::InsertUser(new) => RowSet::single(
                sqlx::query_as::<_, UserRecord>(
                    r#"
                    INSERT INTO users (external_id, username, language)
                    VALUES ($1, $2, $3)
                    RETURNING *
                    "#,
                )
                .bind(&new.external_id)
                .bind(&new.username)
                .bind(&new.language)
                .fetch_one(&mut *conn)
                .await?,
            ),

            Statement::FindProject {
                user_id,
                project_id,
            } => RowSet::from_rows(
                sqlx::query_as::<_, ProjectRecord>(
                    "SELECT * FROM projects WHERE id = $1 AND user_id = $2",
                )
                .bind(project_id)
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::FindProjectById { project_id } => RowSet::from_rows(
                sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects WHERE id = $1")
                    .bind(project_id)
                    .fetch_optional(&mut *conn)
                    .await?,
            ),
            Statement::InsertProject(new) => RowSet::single(
                sqlx::query_as::<_, ProjectRecord>(
                    r#"
                    INSERT INTO projects
                        (user_id, remixed_from, version, title, language, thumbnail_400, thumbnail_1024)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(new.user_id)
                .bind(new.remixed_from)
                .bind(&new.version)
                .bind(&new.title)
                .bind(&new.language)
                .bind(&new.thumbnail_400)
                .bind(&new.thumbnail_1024)
                .fetch_one(&mut *conn)
                .await?,
            ),
            Statement::UpdateProject {
                project_id,
                changes,
            } => RowSet::from_rows(
                sqlx::query_as::<_, ProjectRecord>(
                    r#"
                    UPDATE projects SET
                        title = COALESCE($2, title),
                        thumbnail_400 = COALESCE($3, thumbnail_400),
                        thumbnail_1024 = COALESCE($4, thumbnail_1024),
                        featured = COALESCE($5, featured),
                        updated_at = now()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(project_id)
                .bind(&changes.title)
                .bind(&changes.thumbnail_400)
                .bind(&changes.thumbnail_1024)
                .bind(changes.featured)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::DeleteProject { project_id } => RowSet::from_rows(
                sqlx::query_as::<_, ProjectRecord>("DELETE FROM projects WHERE id = $1 RETURNING *")
                    .bind(project_id)
                    .fetch_optional(&mut *conn)
                    .await?,
            ),

            Statement::FindPage {
                project_id,
                page_id,
            } => RowSet::from_rows(
                sqlx::query_as::<_, PageRecord>(
                    "SELECT * FROM pages WHERE id = $1 AND project_id = $2",
                )
                .bind(page_id)
                .bind(project_id)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::FindCanonicalPage { project_id } => RowSet::from_rows(
                sqlx::query_as::<_, PageRecord>(
                    "SELECT * FROM pages WHERE project_id = $1 ORDER BY x, y, id LIMIT 1",
                )
                .bind(project_id)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::InsertPage(new) => RowSet::single(
                sqlx::query_as::<_, PageRecord>(
                    r#"
                    INSERT INTO pages (project_id, x, y, styles)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *
                    "#,
                )
                .bind(new.project_id)
                .bind(new.position.x)
                .bind(new.position.y)
                .bind(&new.styles)
                .fetch_one(&mut *conn)
                .await?,
            ),
            Statement::UpdatePage {
                project_id,
                page_id,
                changes,
            } => RowSet::from_rows(
                sqlx::query_as::<_, PageRecord>(
                    r#"
                    UPDATE pages SET
                        x = COALESCE($3, x),
                        y = COALESCE($4, y),
                        styles = COALESCE($5, styles),
                        updated_at = now()
                    WHERE id = $1 AND project_id = $2
                    RETURNING *
                    "#,
                )
                .bind(page_id)
                .bind(project_id)
                .bind(changes.x)
                .bind(changes.y)
                .bind(&changes.styles)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::DeletePage {
                project_id,
                page_id,
            } => RowSet::from_rows(
                sqlx::query_as::<_, PageRecord>(
                    "DELETE FROM pages WHERE id = $1 AND project_id = $2 RETURNING *",
                )
                .bind(page_id)
                .bind(project_id)
                .fetch_optional(&mut *conn)
                .await?,
            ),

            Statement::InsertElement(new) => RowSet::single(
                sqlx::query_as::<_, ElementRecord>(
                    r#"
                    INSERT INTO elements (page_id, type, attributes, styles)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *
                    "#,
                )
                .bind(new.page_id)
                .bind(&new.element_type)
                .bind(&new.attributes)
                .bind(&new.styles)
                .fetch_one(&mut *conn)
                .await?,
            ),
            Statement::UpdateElement {
                page_id,
                element_id,
                changes,
            } => RowSet::from_rows(
                sqlx::query_as::<_, ElementRecord>(
                    r#"
                    UPDATE elements SET
                        type = COALESCE($3, type),
                        attributes = COALESCE($4, attributes),
                        styles = COALESCE($5, styles),
                        updated_at = now()
                    WHERE id = $1 AND page_id = $2
                    RETURNING *
                    "#,
                )
                .bind(element_id)
                .bind(page_id)
                .bind(&changes.element_type)
                .bind(&changes.attributes)
                .bind(&changes.styles)
                .fetch_optional(&mut *conn)
                .await?,
            ),
            Statement::DeleteElement {
                page_id,
                element_id,
            } => RowSet::from_rows(
                sqlx::query_as::<_, ElementRecord>(
                    "DELETE FROM elements WHERE id = $1 AND page_id = $2 RETURNING *",
                )
                .bind(element_id)
                .bind(page_id)
                .fetch_optional(&mut *conn)
                .await?,
            ),
        };
        Ok(rows)
    }
}
