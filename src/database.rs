//! PostgreSQL connection pool.
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "tracker";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Connection options of the profile database.
#[derive(Debug, Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections and run pending migrations.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        sqlx::migrate!().run(&postgres).await?;

        Ok(Self { postgres })
    }
}
