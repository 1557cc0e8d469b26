use serde::Serialize;
use sqlx::types::time::OffsetDateTime;
use sqlx::{sqlite::SqlitePoolOptions, Executor, Pool, Sqlite};
use std::collections::HashMap;

use crate::error::{AppError, DBErrorContext, Result};

#[derive(Debug, Clone)]
pub struct DBService {
    pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub project_id: i64,
    pub path: String,
    pub filename: String,
    #[serde(skip_serializing)]
    pub created_at: OffsetDateTime,
}

/// An image row to be created alongside its project. `filename` is the
/// url-encoded object key, `path` the public URL derived from it.
#[derive(Debug)]
pub struct NewImage {
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectWithImages {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    /// scrypt PHC string, never the plaintext. Never serialized either,
    /// responses go through [`UserView`].
    pub password: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
        }
    }
}

impl DBService {
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool_res = SqlitePoolOptions::new()
            .max_connections(2)
            .after_connect(|conn, _meta| {
                // sqlite doesn't allow multiple writers at the same time and
                // this application is mostly idle, so a write collision is
                // incredibly unlikely. WAL lets read transactions proceed
                // alongside the (at most one) write transaction.
                // See https://www.sqlite.org/wal.html
                Box::pin(async move {
                    conn.execute("PRAGMA journal_mode=WAL;").await?;
                    Ok(())
                })
            })
            .connect(db_path)
            .await;
        match pool_res {
            Ok(pool) => Ok(DBService { pool }),
            Err(err) => Err(AppError::DBInitError {
                path: db_path.to_owned(),
                source: err,
            }),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        sqlx::query_as::<_, Project>("SELECT * FROM project ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .with_context(|| "cannot list projects")
    }

    pub async fn list_projects_with_images(&self) -> Result<Vec<ProjectWithImages>> {
        let projects = self.list_projects().await?;
        let images = sqlx::query_as::<_, Image>("SELECT * FROM image ORDER BY project_id, id")
            .fetch_all(&self.pool)
            .await
            .with_context(|| "cannot list images")?;

        let mut by_project: HashMap<i64, Vec<Image>> = HashMap::new();
        for img in images {
            by_project.entry(img.project_id).or_default().push(img);
        }

        Ok(projects
            .into_iter()
            .map(|p| {
                let images = by_project.remove(&p.id).unwrap_or_default();
                ProjectWithImages {
                    project: p,
                    images: Some(images),
                }
            })
            .collect())
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        sqlx::query_as::<_, Project>("SELECT * FROM project WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("cannot get project {id}"))
    }

    /// Persists the project and all its image rows in one transaction.
    /// Nothing is written if any insert fails.
    pub async fn create_project(
        &self,
        title: &str,
        description: &str,
        images: &[NewImage],
    ) -> Result<ProjectWithImages> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| "cannot begin transaction")?;

        let project = sqlx::query_as::<_, Project>(
            "INSERT INTO project (title, description, created_at)
            VALUES (?,?,?)
            RETURNING *",
        )
        .bind(title)
        .bind(description)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|source| AppError::CreateFailed {
            what: "project",
            source,
        })?;

        let mut rows = Vec::with_capacity(images.len());
        for img in images {
            let row = sqlx::query_as::<_, Image>(
                "INSERT INTO image (project_id, path, filename, created_at)
                VALUES (?,?,?,?)
                RETURNING *",
            )
            .bind(project.id)
            .bind(&img.path)
            .bind(&img.filename)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|source| AppError::CreateFailed {
                what: "project",
                source,
            })?;
            rows.push(row);
        }

        tx.commit()
            .await
            .with_context(|| format!("cannot commit project {}", project.id))?;

        tracing::info!(
            "created project {} with {} images",
            project.id,
            rows.len()
        );

        Ok(ProjectWithImages {
            project,
            images: Some(rows),
        })
    }

    /// Sparse update: a `None` field leaves the stored value untouched.
    pub async fn update_project(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Project>> {
        sqlx::query_as::<_, Project>(
            "UPDATE project
            SET title=COALESCE(?, title), description=COALESCE(?, description)
            WHERE id=?
            RETURNING *",
        )
        .bind(title)
        .bind(description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| AppError::UpdateFailed {
            what: "project",
            source,
        })
    }

    /// Deletes the image rows then the project row, in one transaction.
    pub async fn delete_project(&self, id: i64) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| "cannot begin transaction")?;

        sqlx::query("DELETE FROM image WHERE project_id=?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("cannot delete images of project {id}"))?;

        sqlx::query("DELETE FROM project WHERE id=?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("cannot delete project {id}"))?;

        tx.commit()
            .await
            .with_context(|| format!("cannot commit deletion of project {id}"))?;
        Ok(())
    }

    pub async fn list_images(&self, project_id: i64) -> Result<Vec<Image>> {
        sqlx::query_as::<_, Image>("SELECT * FROM image WHERE project_id=? ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("cannot list images of project {project_id}"))
    }

    pub async fn get_image(&self, id: i64) -> Result<Option<Image>> {
        sqlx::query_as::<_, Image>("SELECT * FROM image WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("cannot get image {id}"))
    }

    pub async fn delete_image(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM image WHERE id=?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("cannot delete image {id}"))?;
        Ok(())
    }

    pub async fn create_user(&self, email: &str, phc: &str) -> Result<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc();
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO user (id, email, password, created_at)
            VALUES (?,?,?,?)
            RETURNING *",
        )
        .bind(&id)
        .bind(email)
        .bind(phc)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| AppError::CreateFailed {
            what: "user",
            source,
        })?;

        tracing::info!("created user {}", user.id);
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM user WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("cannot get user {id}"))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM user WHERE email=?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| "cannot get user by email")
    }

    pub async fn update_user(&self, id: &str, email: &str, phc: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "UPDATE user SET email=?, password=? WHERE id=? RETURNING *",
        )
        .bind(email)
        .bind(phc)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| AppError::UpdateFailed {
            what: "user",
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::DBService;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory db, single connection so every query sees the same database.
    pub(crate) async fn memory_db() -> DBService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = DBService { pool };
        db.migrate().await.unwrap();
        db
    }

    /// Same, but without running the migrations: every write fails.
    pub(crate) async fn broken_db() -> DBService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        DBService { pool }
    }
}
