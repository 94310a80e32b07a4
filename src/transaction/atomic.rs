use crate::engine::{PgEngine, run_sync};
use crate::error::EngineError;
use crate::querystring::QueryString;

/// One unit of work queued on an [`Atomic`].
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(QueryString),
    Ddl(String),
}

impl From<QueryString> for Statement {
    fn from(query: QueryString) -> Self {
        Statement::Query(query)
    }
}

/// Build up a transaction programmatically, then run it in one go.
///
/// ```rust,no_run
/// # use pg_orm_engine::prelude::*;
/// # async fn demo(engine: &PgEngine) -> Result<(), EngineError> {
/// let mut atomic = engine.atomic();
/// atomic.add(Statement::Ddl("CREATE TABLE band (name TEXT)".into()));
/// atomic.add(QueryString::raw("INSERT INTO band (name) VALUES ({})").arg("Pythonistas"));
/// atomic.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Atomic {
    engine: PgEngine,
    statements: Vec<Statement>,
}

impl Atomic {
    pub(crate) fn new(engine: PgEngine) -> Self {
        Self {
            engine,
            statements: Vec::new(),
        }
    }

    pub fn add(&mut self, statement: impl Into<Statement>) {
        self.statements.push(statement.into());
    }

    pub fn extend<I>(&mut self, statements: I)
    where
        I: IntoIterator,
        I::Item: Into<Statement>,
    {
        self.statements.extend(statements.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Run every queued statement in a single transaction.
    ///
    /// The queue is emptied whether or not the run succeeds.
    ///
    /// # Errors
    /// Returns the first failing statement's error; the transaction is rolled back.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let statements = std::mem::take(&mut self.statements);
        let engine = self.engine.clone();
        self.engine
            .transaction(true, |_tx| async move {
                for statement in &statements {
                    match statement {
                        Statement::Query(query) => engine.run_querystring(query, true).await?,
                        Statement::Ddl(ddl) => engine.run_ddl(ddl, true).await?,
                    };
                }
                Ok(())
            })
            .await
    }

    /// Blocking variant of [`Atomic::run`].
    ///
    /// # Errors
    /// Same as [`Atomic::run`], plus an error when called from inside a runtime.
    pub fn run_sync(&mut self) -> Result<(), EngineError> {
        run_sync(self.run())?
    }
}
