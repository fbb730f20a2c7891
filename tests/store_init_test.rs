use slarchive::store::db::{create_store_pool, get_connection};
use slarchive::store::operations;

#[tokio::test]
async fn pool_creation_runs_migrations_and_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("archive.db");

    let pool = create_store_pool(&db_path).unwrap();
    assert!(db_path.exists());

    let mut conn = get_connection(&pool).await.unwrap();
    operations::upsert_workspace(&mut conn, "T1", "Acme", "xoxb-test").unwrap();
    let workspace = operations::workspace(&mut conn, "T1").unwrap().unwrap();
    assert_eq!(workspace.name, "Acme");
}

#[tokio::test]
async fn pool_creation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");

    create_store_pool(&db_path).unwrap();
    let pool = create_store_pool(&db_path).unwrap();
    let mut conn = get_connection(&pool).await.unwrap();
    assert!(operations::workspace(&mut conn, "T1").unwrap().is_none());
}
