#![allow(clippy::unwrap_used, clippy::expect_used)]
#![cfg(feature = "integration")]

//! RLS enforcement against a real `PostgreSQL`, through a non-superuser role.

mod common;

use std::sync::Arc;

use rlskit_db::{ConnectOpts, PolicyField, RlsDb, RlsPolicy, SqlType};
use rlskit_security::{RlsContext, RlsSettings, RlsValue};
use sea_orm::{ConnectionTrait, DbBackend, Statement};

const APP_ROLE: &str = "rls_app";
const APP_PASSWORD: &str = "app";

fn settings() -> RlsSettings {
    RlsSettings {
        enforce_fields: vec!["tenant_id".to_owned(), "user_id".to_owned()],
        ..RlsSettings::default()
    }
}

/// Creates the schema and policy as the superuser and returns a handle
/// connected as the application role.
async fn setup(pg: &common::DbUnderTest, opts: &ConnectOpts) -> RlsDb {
    let s = Arc::new(settings());
    let admin = RlsDb::connect(&pg.admin_url(), &ConnectOpts::default(), Arc::clone(&s))
        .await
        .unwrap();

    admin
        .execute_script(&format!(
            "CREATE ROLE {APP_ROLE} LOGIN PASSWORD '{APP_PASSWORD}' NOSUPERUSER NOBYPASSRLS;
             CREATE TABLE orders (
                 id serial PRIMARY KEY,
                 tenant_id int NOT NULL,
                 user_id int NOT NULL,
                 title text NOT NULL
             );
             INSERT INTO orders (tenant_id, user_id, title) VALUES
                 (123, 456, 'mine'),
                 (123, 789, 'colleague'),
                 (999, 456, 'other tenant');
             GRANT SELECT, INSERT ON orders TO {APP_ROLE};
             GRANT USAGE ON SEQUENCE orders_id_seq TO {APP_ROLE};"
        ))
        .await
        .unwrap();

    let policy = RlsPolicy::new(
        &s,
        "orders",
        vec![
            PolicyField::new("tenant_id", SqlType::Int),
            PolicyField::new("user_id", SqlType::Int),
        ],
    )
    .unwrap();
    admin.execute_script(&policy.up_sql()).await.unwrap();
    admin.close().await;

    RlsDb::connect(&pg.url_for(APP_ROLE, APP_PASSWORD), opts, s)
        .await
        .unwrap()
}

async fn titles(db: &RlsDb, ctx: &RlsContext) -> Vec<String> {
    let mut conn = db.acquire(ctx).await.unwrap();
    sqlx::query_scalar("SELECT title FROM orders ORDER BY id")
        .fetch_all(conn.as_postgres().unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn policy_returns_only_matching_rows() {
    let pg = common::bring_up_postgres().await.unwrap();
    let db = setup(&pg, &ConnectOpts::default()).await;

    let ctx = RlsContext::builder()
        .value("tenant_id", 123_i64)
        .value("user_id", 456_i64)
        .build();
    assert_eq!(titles(&db, &ctx).await, ["mine"]);

    let tenant_wide = RlsContext::builder()
        .value("tenant_id", 123_i64)
        .value("user_id", RlsValue::All)
        .build();
    assert_eq!(titles(&db, &tenant_wide).await, ["mine", "colleague"]);

    let bypass = RlsContext::bypass_all(&db.settings().enforce_fields);
    assert_eq!(titles(&db, &bypass).await.len(), 3);

    // missing field and explicit "no value" both fail closed
    let partial = RlsContext::builder().value("tenant_id", 123_i64).build();
    assert!(titles(&db, &partial).await.is_empty());
    let none = RlsContext::builder()
        .value("tenant_id", 123_i64)
        .no_value("user_id")
        .build();
    assert!(titles(&db, &none).await.is_empty());
    assert!(titles(&db, &RlsContext::empty()).await.is_empty());
}

#[tokio::test]
async fn literal_wildcard_text_is_not_a_wildcard() {
    let pg = common::bring_up_postgres().await.unwrap();
    let db = setup(&pg, &ConnectOpts::default()).await;

    let ctx = RlsContext::builder()
        .value("tenant_id", "*")
        .value("user_id", RlsValue::All)
        .build();
    let mut conn = db.acquire(&ctx).await.unwrap();
    // '*' reaches the ::int cast and fails instead of matching everything
    let res: Result<Vec<String>, _> = sqlx::query_scalar("SELECT title FROM orders")
        .fetch_all(conn.as_postgres().unwrap())
        .await;
    assert!(res.is_err());
}

#[tokio::test]
async fn pooled_connection_never_leaks_previous_context() {
    let pg = common::bring_up_postgres().await.unwrap();
    let opts = ConnectOpts {
        max_conns: Some(1),
        ..ConnectOpts::default()
    };
    let db = setup(&pg, &opts).await;

    let a = RlsContext::builder()
        .value("tenant_id", 123_i64)
        .value("user_id", 456_i64)
        .build();
    let b = RlsContext::builder()
        .value("tenant_id", 456_i64)
        .value("user_id", 1_i64)
        .build();

    let read_tenant = "SELECT current_setting('rls.tenant_id', true)";

    let mut conn = db.acquire(&a).await.unwrap();
    let seen: Option<String> = sqlx::query_scalar(read_tenant)
        .fetch_one(conn.as_postgres().unwrap())
        .await
        .unwrap();
    assert_eq!(seen.as_deref(), Some("123"));
    drop(conn);

    // same physical connection, reset by the release hook
    let row = db
        .sea()
        .query_one(Statement::from_string(DbBackend::Postgres, read_tenant))
        .await
        .unwrap()
        .unwrap();
    let seen: Option<String> = row.try_get_by_index(0).unwrap();
    assert_ne!(seen.as_deref(), Some("123"));

    let mut conn = db.acquire(&b).await.unwrap();
    let seen: Option<String> = sqlx::query_scalar(read_tenant)
        .fetch_one(conn.as_postgres().unwrap())
        .await
        .unwrap();
    assert_eq!(seen.as_deref(), Some("456"));
    drop(conn);

    let mut conn = db.acquire(&RlsContext::empty()).await.unwrap();
    let mode: Option<String> =
        sqlx::query_scalar("SELECT current_setting('rls_mode.tenant_id', true)")
            .fetch_one(conn.as_postgres().unwrap())
            .await
            .unwrap();
    assert_eq!(mode.as_deref(), Some(""));
}

#[tokio::test]
async fn transaction_scope_checks_inserts_and_expires() {
    let pg = common::bring_up_postgres().await.unwrap();
    let db = setup(&pg, &ConnectOpts::default()).await;

    let ctx = RlsContext::builder()
        .value("tenant_id", 123_i64)
        .value("user_id", 456_i64)
        .build();

    let txn = db.begin(&ctx).await.unwrap();
    txn.execute_unprepared(
        "INSERT INTO orders (tenant_id, user_id, title) VALUES (123, 456, 'new')",
    )
    .await
    .unwrap();
    let rows = txn
        .query_all(Statement::from_string(
            DbBackend::Postgres,
            "SELECT title FROM orders ORDER BY id",
        ))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    txn.commit().await.unwrap();

    // WITH CHECK rejects rows outside the context
    let txn = db.begin(&ctx).await.unwrap();
    let foreign = txn
        .execute_unprepared(
            "INSERT INTO orders (tenant_id, user_id, title) VALUES (999, 456, 'sneaky')",
        )
        .await;
    assert!(foreign.is_err());
    txn.rollback().await.unwrap();

    // transaction-local values are gone after commit
    let row = db
        .sea()
        .query_one(Statement::from_string(
            DbBackend::Postgres,
            "SELECT current_setting('rls_mode.tenant_id', true)",
        ))
        .await
        .unwrap()
        .unwrap();
    let mode: Option<String> = row.try_get_by_index(0).unwrap();
    assert_ne!(mode.as_deref(), Some("value"));
}
