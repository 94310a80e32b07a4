#![allow(dead_code)]

use pg_orm_engine::prelude::*;
use pg_orm_engine::test_utils::EmbeddedPostgres;

pub async fn setup(
    database: &str,
) -> Result<(EmbeddedPostgres, PgEngine), Box<dyn std::error::Error>> {
    let pg = EmbeddedPostgres::start(database).await?;
    let engine = pg.engine();
    engine
        .run_ddl(
            "DROP TABLE IF EXISTS manager; \
             CREATE TABLE manager (id SERIAL PRIMARY KEY, name VARCHAR(50));",
            true,
        )
        .await?;
    Ok((pg, engine))
}

pub async fn insert_manager(engine: &PgEngine, name: &str) -> Result<(), EngineError> {
    engine
        .run_querystring(
            &QueryString::raw("INSERT INTO manager (name) VALUES ({})").arg(name),
            true,
        )
        .await?;
    Ok(())
}

pub async fn count_managers(engine: &PgEngine) -> Result<i64, EngineError> {
    let rs = engine
        .run_querystring(&QueryString::raw("SELECT COUNT(*) AS cnt FROM manager"), true)
        .await?;
    rs.results
        .first()
        .and_then(|row| row.get("cnt"))
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| EngineError::ExecutionError("missing count".into()))
}

pub async fn manager_names(engine: &PgEngine) -> Result<Vec<String>, EngineError> {
    let rs = engine
        .run_querystring(&QueryString::raw("SELECT name FROM manager ORDER BY id"), true)
        .await?;
    Ok(rs
        .results
        .iter()
        .filter_map(|row| row.get("name").and_then(RowValues::as_text).map(str::to_string))
        .collect())
}
