use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pg_orm_engine::ConnectionConfig;
use pg_orm_engine::config::{
    DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PASSWORD, DEFAULT_PORT, DEFAULT_USER,
};
use pg_orm_engine::prelude::RowValues;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run queries through the PostgreSQL engine")]
pub(crate) struct Args {
    #[command(flatten)]
    pub(crate) connection: ConnectionArgs,
    /// Also write log output to this file.
    #[arg(long, global = true)]
    pub(crate) log: Option<PathBuf>,
    /// Log each statement and its result.
    #[arg(long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct ConnectionArgs {
    #[arg(long, env = "PG_HOST", default_value = DEFAULT_HOST, global = true)]
    pub(crate) host: String,
    #[arg(long, env = "PG_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub(crate) port: u16,
    #[arg(long, env = "PG_USER", default_value = DEFAULT_USER, global = true)]
    pub(crate) user: String,
    #[arg(
        long,
        env = "PG_PASSWORD",
        default_value = DEFAULT_PASSWORD,
        hide_env_values = true,
        global = true
    )]
    pub(crate) password: String,
    #[arg(long, env = "PG_DATABASE", default_value = DEFAULT_DATABASE, global = true)]
    pub(crate) database: String,
    /// Connection string; overrides the other connection flags.
    #[arg(long, env = "PG_DSN", hide_env_values = true, global = true)]
    pub(crate) dsn: Option<String>,
    /// Extensions to create with `prep`.
    #[arg(long = "extension", global = true)]
    pub(crate) extensions: Vec<String>,
}

impl ConnectionArgs {
    pub(crate) fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            dsn: self.dsn.clone().filter(|dsn| !dsn.is_empty()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print the server version.
    Version,
    /// Create the configured extensions.
    Prep,
    /// Run a query and print its rows as JSON.
    Query {
        /// SQL with `{}` placeholders.
        sql: String,
        /// Placeholder values, in order.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<RowValues>,
        /// Stream rows through a cursor, this many at a time.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run DDL (one or more statements).
    Ddl { sql: String },
}

/// Integers, floats, booleans and `null` are typed; anything else is text.
fn parse_param(raw: &str) -> Result<RowValues, String> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(RowValues::Int(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Ok(RowValues::Float(f));
    }
    Ok(match raw {
        "true" => RowValues::Bool(true),
        "false" => RowValues::Bool(false),
        "null" => RowValues::Null,
        other => RowValues::Text(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_typed() {
        assert_eq!(parse_param("42").unwrap(), RowValues::Int(42));
        assert_eq!(parse_param("1.5").unwrap(), RowValues::Float(1.5));
        assert_eq!(parse_param("true").unwrap(), RowValues::Bool(true));
        assert_eq!(parse_param("null").unwrap(), RowValues::Null);
        assert_eq!(parse_param("Bob").unwrap(), RowValues::Text("Bob".into()));
    }

    #[test]
    fn query_subcommand_parses() {
        let args = Args::try_parse_from([
            "pgengine",
            "--host",
            "db",
            "query",
            "SELECT * FROM band WHERE id = {}",
            "--param",
            "3",
            "--batch-size",
            "50",
        ])
        .unwrap();
        assert_eq!(args.connection.host, "db");
        match args.command {
            Command::Query {
                params, batch_size, ..
            } => {
                assert_eq!(params, vec![RowValues::Int(3)]);
                assert_eq!(batch_size, Some(50));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn dsn_flag_lands_in_config() {
        let args = Args::try_parse_from([
            "pgengine",
            "--dsn",
            "postgres://a:b@h:1/d",
            "version",
        ])
        .unwrap();
        let cfg = args.connection.to_config();
        assert_eq!(cfg.dsn.as_deref(), Some("postgres://a:b@h:1/d"));
    }
}
