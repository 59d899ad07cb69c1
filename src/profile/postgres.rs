//! Profile rows in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::ProfileStore;
use crate::account::Profile;
use crate::classify::BackendError;

/// Profile store on the `users` table.
#[derive(Debug, Clone)]
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    /// Create a new [`PostgresProfileStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<Row> for Profile {
    fn from(row: Row) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// Map a [`sqlx::Error`] onto a [`BackendError`].
pub(crate) fn backend_error(err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::PoolTimedOut => BackendError::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            BackendError::Transport(err.to_string())
        },
        sqlx::Error::Database(db) => BackendError::Api {
            status: None,
            code: db.code().map(|code| code.into_owned()),
            message: db.message().to_owned(),
        },
        other => BackendError::Api {
            status: None,
            code: None,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<(), BackendError> {
        sqlx::query(
            r#"INSERT INTO "users" (id, email, name, created_at) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Profile>, BackendError> {
        let row: Option<Row> = sqlx::query_as(
            r#"SELECT id, email, name, created_at FROM "users" WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(row.map(Profile::from))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Failure, classify};

    #[test]
    fn test_error_mapping() {
        assert_eq!(backend_error(sqlx::Error::PoolTimedOut), BackendError::Timeout);
        assert_eq!(
            classify(&backend_error(sqlx::Error::PoolClosed)),
            Failure::Network
        );

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify(&backend_error(sqlx::Error::Io(io))), Failure::Network);

        let other = backend_error(sqlx::Error::RowNotFound);
        assert_eq!(classify(&other), Failure::Unknown);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL instance in DATABASE_URL"]
    async fn test_insert_and_find(pool: PgPool) {
        let store = PostgresProfileStore::new(pool);
        let profile = Profile {
            id: "0b6f4f9e".into(),
            email: "a@b.com".into(),
            name: "A".into(),
            created_at: Utc::now(),
        };

        store.insert(&profile).await.unwrap();
        let found = store.find_by_id(&profile.id).await.unwrap().unwrap();
        assert_eq!(found.email, profile.email);

        let err = store.insert(&profile).await.unwrap_err();
        assert_eq!(classify(&err), Failure::Duplicate);
    }
}
