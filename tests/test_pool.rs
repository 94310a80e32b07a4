#![cfg(feature = "test-utils")]

mod common;

use common::{count_managers, insert_manager, manager_names, setup};
use pg_orm_engine::prelude::*;

#[tokio::test]
async fn create_and_close_pool() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("pool_lifecycle").await?;

    engine.start_connection_pool(PoolOptions::default()).await?;
    assert!(engine.has_pool().await);

    // A second start keeps the running pool.
    engine
        .start_connection_pool(PoolOptions::default().with_max_size(8))
        .await?;
    assert!(engine.has_pool().await);

    engine.close_connection_pool().await?;
    assert!(!engine.has_pool().await);

    // Closing again only warns.
    engine.close_connection_pool().await?;

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn make_query_through_pool() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("pool_query").await?;
    engine.start_connection_pool(PoolOptions::default()).await?;

    insert_manager(&engine, "Bob").await?;
    assert!(manager_names(&engine).await?.contains(&"Bob".to_string()));

    engine.close_connection_pool().await?;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn make_many_queries() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("pool_many").await?;
    engine.start_connection_pool(PoolOptions::default()).await?;
    insert_manager(&engine, "Bob").await?;

    let mut handles = Vec::new();
    for _ in 0..200 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let rs = engine
                .run_querystring(&QueryString::raw("SELECT name FROM manager"), true)
                .await?;
            assert_eq!(rs.results[0].get("name").and_then(RowValues::as_text), Some("Bob"));
            Ok::<(), EngineError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    engine.close_connection_pool().await?;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
#[allow(deprecated)]
async fn misspelled_pool_methods_still_work() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("pool_typo").await?;

    engine.start_connnection_pool(PoolOptions::default()).await?;
    assert!(engine.has_pool().await);
    engine.close_connnection_pool().await?;
    assert!(!engine.has_pool().await);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn queries_bypass_pool_when_asked() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("pool_bypass").await?;

    // No pool running: in_pool falls through to a fresh connection.
    insert_manager(&engine, "Dave").await?;
    assert_eq!(count_managers(&engine).await?, 1);

    engine.start_connection_pool(PoolOptions::default()).await?;
    let rs = engine
        .run_querystring(&QueryString::raw("SELECT COUNT(*) AS cnt FROM manager"), false)
        .await?;
    assert_eq!(rs.results[0].get("cnt").and_then(RowValues::as_int), Some(&1));
    engine.close_connection_pool().await?;

    pg.stop().await;
    Ok(())
}
