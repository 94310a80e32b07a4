#![cfg(feature = "test-utils")]

mod common;

use common::{count_managers, insert_manager, manager_names, setup};
use pg_orm_engine::prelude::*;

#[tokio::test]
async fn cancelled_transaction_rolls_back_and_frees_connection()
-> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("drop_transaction").await?;
    engine
        .start_connection_pool(PoolOptions::default().with_max_size(1))
        .await?;

    let (inserted_tx, inserted_rx) = tokio::sync::oneshot::channel();
    let worker = engine.clone();
    let handle = tokio::spawn(async move {
        let e = worker.clone();
        worker
            .transaction(true, |_tx| async move {
                insert_manager(&e, "Bob").await?;
                let _ = inserted_tx.send(());
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
    });

    inserted_rx.await?;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    // The only pooled connection comes back once the rollback has run.
    assert_eq!(count_managers(&engine).await?, 0);
    insert_manager(&engine, "Sally").await?;
    assert_eq!(manager_names(&engine).await?, vec!["Sally"]);

    engine.close_connection_pool().await?;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn dropped_batch_closes_its_cursor() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("drop_batch").await?;
    engine
        .start_connection_pool(PoolOptions::default().with_max_size(1))
        .await?;
    for i in 0..5 {
        insert_manager(&engine, &format!("Manager {i}")).await?;
    }

    let mut batch = engine
        .batch(&QueryString::raw("SELECT name FROM manager ORDER BY id"), 2, None)
        .await?;
    assert_eq!(batch.next().await?.map(|rows| rows.len()), Some(2));
    drop(batch);

    // Same connection again: no cursor left and no transaction holding it.
    let rs = engine
        .run_querystring(&QueryString::raw("SELECT COUNT(*) AS cnt FROM pg_cursors"), true)
        .await?;
    assert_eq!(rs.results[0].get("cnt").and_then(RowValues::as_int), Some(&0));
    assert_eq!(count_managers(&engine).await?, 5);

    engine.close_connection_pool().await?;
    pg.stop().await;
    Ok(())
}
