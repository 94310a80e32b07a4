#![cfg(feature = "test-utils")]

mod common;

use common::{count_managers, insert_manager, setup};
use pg_orm_engine::prelude::*;

#[tokio::test]
async fn nested_transaction_joins_parent() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("nested_join").await?;

    let e = engine.clone();
    let result = engine
        .transaction(true, |outer| async move {
            insert_manager(&e, "Bob").await?;
            let inner_engine = e.clone();
            e.transaction(true, |inner| async move {
                assert!(inner_engine.transaction_exists());
                insert_manager(&inner_engine, "Sally").await?;
                // Same transaction, so savepoint numbering is shared.
                let savepoint = inner.savepoint(None).await?;
                assert_eq!(savepoint.name(), "savepoint_1");
                assert_eq!(outer.get_savepoint_id(), 2);
                Ok(())
            })
            .await?;
            // Fails the whole outer transaction, inner writes included.
            Err::<(), _>(EngineError::Other("abort".into()))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(count_managers(&engine).await?, 0);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn disallowed_nested_transaction_errors() -> Result<(), Box<dyn std::error::Error>> {
    let (pg, engine) = setup("nested_disallowed").await?;

    let e = engine.clone();
    engine
        .transaction(true, |_tx| async move {
            insert_manager(&e, "Bob").await?;
            let err = e
                .transaction(false, |_inner| async { Ok(()) })
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::TransactionError(_)));
            Ok(())
        })
        .await?;

    assert_eq!(count_managers(&engine).await?, 1);
    pg.stop().await;
    Ok(())
}
