use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connects to `DATABASE_URL` and migrates, or returns `None` so the test is skipped.
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres repository tests: {error}");
    }

    Some(pool)
}

pub(crate) async fn insert_dataset(pool: &PgPool, owner_group: &str) -> Uuid {
    let dataset_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO datasets (name, owner_group, pii)
        VALUES ('persons', $1, 'sensitive')
        RETURNING id
        "#,
    )
    .bind(owner_group)
    .fetch_one(pool)
    .await;

    assert!(dataset_id.is_ok());
    dataset_id.unwrap_or_else(|_| unreachable!())
}

pub(crate) async fn insert_datasource(
    pool: &PgPool,
    dataset_id: Uuid,
    table_name: &str,
    pseudo_columns: &[&str],
    is_reference: bool,
) -> Uuid {
    let pseudo_columns: Vec<String> = pseudo_columns.iter().map(|column| (*column).to_owned()).collect();
    let datasource_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO datasources_bigquery (dataset_id, project_id, dataset, table_name, pseudo_columns, is_reference)
        VALUES ($1, 'team-prod', 'markedsplassen', $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(dataset_id)
    .bind(table_name)
    .bind(pseudo_columns)
    .bind(is_reference)
    .fetch_one(pool)
    .await;

    assert!(datasource_id.is_ok());
    datasource_id.unwrap_or_else(|_| unreachable!())
}
