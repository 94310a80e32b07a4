#![cfg(feature = "test-utils")]

mod common;

use common::{count_managers, insert_manager, manager_names, setup};
use pg_orm_engine::prelude::*;

fn txid(rs: &ResultSet) -> Option<i64> {
    rs.results
        .first()
        .and_then(|row| row.get("txid_current"))
        .and_then(RowValues::as_int)
        .copied()
}

#[tokio::test]
async fn error_inside_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_error").await?;

    let e = engine.clone();
    let result = engine
        .transaction(true, |_tx| async move {
            insert_manager(&e, "Bob").await?;
            e.run_querystring(&QueryString::raw("MALFORMED QUERY ... SHOULD ERROR"), true)
                .await?;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(EngineError::PostgresError(_))));
    assert_eq!(count_managers(&engine).await?, 0);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn successful_transaction_commits() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_success").await?;

    let e = engine.clone();
    engine
        .transaction(true, |_tx| async move {
            insert_manager(&e, "Bob").await?;
            insert_manager(&e, "Sally").await?;
            Ok(())
        })
        .await?;

    assert_eq!(manager_names(&engine).await?, vec!["Bob", "Sally"]);
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn manual_commit_and_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_manual").await?;

    let e = engine.clone();
    engine
        .transaction(true, |tx| async move {
            insert_manager(&e, "Bob").await?;
            tx.commit().await?;
            assert!(tx.is_committed());
            Ok(())
        })
        .await?;
    assert_eq!(count_managers(&engine).await?, 1);

    let e = engine.clone();
    engine
        .transaction(true, |tx| async move {
            insert_manager(&e, "Sally").await?;
            tx.rollback().await?;
            assert!(tx.is_rolled_back());
            Ok(())
        })
        .await?;
    assert_eq!(manager_names(&engine).await?, vec!["Bob"]);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn queries_share_the_transaction_id() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_ids").await?;
    let select = QueryString::raw("SELECT txid_current()");

    let e = engine.clone();
    let q = select.clone();
    let (first, second) = engine
        .transaction(true, |_tx| async move {
            let a = txid(&e.run_querystring(&q, true).await?);
            let b = txid(&e.run_querystring(&q, true).await?);
            Ok((a, b))
        })
        .await?;
    assert!(first.is_some());
    assert_eq!(first, second);

    let e = engine.clone();
    let q = select.clone();
    let third = engine
        .transaction(true, |_tx| async move { Ok(txid(&e.run_querystring(&q, true).await?)) })
        .await?;
    assert_ne!(first, third);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn transaction_exists_only_inside_scope() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_exists").await?;
    assert!(!engine.transaction_exists());

    let e = engine.clone();
    let inside = engine
        .transaction(true, |_tx| async move { Ok(e.transaction_exists()) })
        .await?;
    assert!(inside);
    assert!(!engine.transaction_exists());

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn closure_body_runs_inside_the_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_closure_scope").await?;

    let e = engine.clone();
    let seen_before_await = engine
        .transaction(true, |_tx| {
            let seen = e.transaction_exists();
            async move { Ok(seen) }
        })
        .await?;
    assert!(seen_before_await);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn rollback_to_anonymous_savepoint() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_savepoint").await?;

    let e = engine.clone();
    engine
        .transaction(true, |tx| async move {
            insert_manager(&e, "Manager 1").await?;
            let savepoint = tx.savepoint(None).await?;
            assert_eq!(savepoint.name(), "savepoint_1");
            insert_manager(&e, "Manager 2").await?;
            savepoint.rollback_to().await?;
            Ok(())
        })
        .await?;

    assert_eq!(manager_names(&engine).await?, vec!["Manager 1"]);
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn rollback_to_named_savepoint() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_named_savepoint").await?;

    let e = engine.clone();
    engine
        .transaction(true, |tx| async move {
            insert_manager(&e, "Manager 1").await?;
            tx.savepoint(Some("my_savepoint1")).await?;
            insert_manager(&e, "Manager 2").await?;
            tx.savepoint(Some("my_savepoint2")).await?;
            insert_manager(&e, "Manager 3").await?;
            tx.rollback_to("my_savepoint1").await?;
            Ok(())
        })
        .await?;

    assert_eq!(manager_names(&engine).await?, vec!["Manager 1"]);
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn released_savepoint_keeps_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_release").await?;

    let e = engine.clone();
    engine
        .transaction(true, |tx| async move {
            let savepoint = tx.savepoint(Some("keep")).await?;
            insert_manager(&e, "Manager 1").await?;
            savepoint.release().await?;
            Ok(())
        })
        .await?;

    assert_eq!(count_managers(&engine).await?, 1);
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn savepoint_name_is_checked() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("tx_savepoint_name").await?;

    let result = engine
        .transaction(true, |tx| async move {
            tx.savepoint(Some("my_savepoint; SELECT * FROM Manager")).await?;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(EngineError::InvalidSavepointName(_))));

    pg.stop().await;
    Ok(())
}
