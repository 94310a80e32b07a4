mod args;
mod logging;

use clap::Parser;
use pg_orm_engine::prelude::*;

use crate::args::{Args, Command};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = logging::init(args.log.clone()) {
        eprintln!("failed to open log file: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), EngineError> {
    let options = EngineOptions::default()
        .with_extensions(args.connection.extensions.clone())
        .with_log_queries(args.verbose)
        .with_log_responses(args.verbose);
    let engine = PgEngine::with_options(args.connection.to_config(), options);

    match args.command {
        Command::Version => {
            let version = engine.check_version().await?;
            println!("{version}");
        }
        Command::Prep => engine.prep_database().await?,
        Command::Ddl { sql } => {
            let rs = engine.run_ddl(&sql, false).await?;
            print_rows(&rs)?;
        }
        Command::Query {
            sql,
            params,
            batch_size,
        } => {
            let values = params.into_iter().map(QueryArg::Value).collect();
            let querystring = QueryString::new(sql, values);
            match batch_size {
                Some(size) => {
                    let mut batch = engine.batch(&querystring, size, None).await?;
                    while let Some(rows) = batch.next().await? {
                        for row in rows.to_json_rows() {
                            println!("{row}");
                        }
                    }
                    batch.close().await?;
                }
                None => {
                    let rs = engine.run_querystring(&querystring, false).await?;
                    print_rows(&rs)?;
                }
            }
        }
    }
    Ok(())
}

fn print_rows(rs: &ResultSet) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(&rs.to_json_rows())
        .map_err(|e| EngineError::Other(format!("failed to render rows: {e}")))?;
    println!("{json}");
    Ok(())
}
