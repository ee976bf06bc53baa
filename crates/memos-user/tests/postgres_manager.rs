//! Postgres user manager integration tests.
//!
//! These run only when `MOS_POSTGRES_HOST` or `POSTGRES_HOST` is set. The
//! manager creates its schema on startup, so point the config at a throwaway
//! schema via `MOS_POSTGRES_SCHEMA`.

use memos_user::{PostgresUserManager, PostgresUserManagerConfig, UserManager, UserRole};
use uuid::Uuid;

fn host_configured() -> bool {
    ["MOS_POSTGRES_HOST", "POSTGRES_HOST"]
        .iter()
        .any(|var| std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false))
}

async fn connect() -> Option<PostgresUserManager> {
    if !host_configured() {
        eprintln!("MOS_POSTGRES_HOST not set, skipping");
        return None;
    }
    let config = PostgresUserManagerConfig::from_env("root");
    Some(PostgresUserManager::new(config).await.unwrap())
}

#[tokio::test]
async fn test_postgres_user_and_cube_lifecycle() {
    let Some(manager) = connect().await else {
        return;
    };
    assert_eq!(manager.backend(), "postgres");
    assert!(manager.validate_user("root").await.unwrap());

    let user_name = format!("it_user_{}", Uuid::new_v4().simple());
    let user_id = manager
        .create_user(&user_name, UserRole::User, None)
        .await
        .unwrap();

    let cube_id = manager
        .create_cube("it_cube", &user_id, None)
        .await
        .unwrap();
    let cube = manager.get_cube(&cube_id).await.unwrap().unwrap();
    assert_eq!(cube.owner_id, user_id);
    assert!(
        manager
            .validate_user_cube_access(&user_id, &cube_id)
            .await
            .unwrap()
    );

    assert!(manager.delete_cube(&cube_id).await.unwrap());
    assert!(manager.delete_user(&user_id).await.unwrap());

    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_postgres_cube_sharing() {
    let Some(manager) = connect().await else {
        return;
    };

    let owner = manager
        .create_user(&format!("it_owner_{}", Uuid::new_v4().simple()), UserRole::User, None)
        .await
        .unwrap();
    let guest = manager
        .create_user(&format!("it_guest_{}", Uuid::new_v4().simple()), UserRole::Guest, None)
        .await
        .unwrap();
    let cube_id = manager.create_cube("it_shared", &owner, None).await.unwrap();

    assert!(
        !manager
            .validate_user_cube_access(&guest, &cube_id)
            .await
            .unwrap()
    );
    manager.add_user_to_cube(&guest, &cube_id).await.unwrap();
    assert!(
        manager
            .validate_user_cube_access(&guest, &cube_id)
            .await
            .unwrap()
    );
    manager.remove_user_from_cube(&guest, &cube_id).await.unwrap();

    assert!(manager.delete_cube(&cube_id).await.unwrap());
    assert!(manager.delete_user(&owner).await.unwrap());
    assert!(manager.delete_user(&guest).await.unwrap());

    manager.close().await.unwrap();
}
