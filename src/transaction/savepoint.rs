use lazy_static::lazy_static;
use regex::Regex;

use super::PgTransaction;
use crate::error::EngineError;

lazy_static! {
    static ref SAVEPOINT_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid regex");
}

/// Savepoint names are spliced into SQL, so only `[a-zA-Z0-9_]` is allowed.
///
/// # Errors
/// Returns `EngineError::InvalidSavepointName` for anything else.
pub fn validate_savepoint_name(name: &str) -> Result<(), EngineError> {
    if SAVEPOINT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(EngineError::InvalidSavepointName(name.to_string()))
    }
}

/// A named `SAVEPOINT` inside an open transaction.
#[derive(Debug, Clone)]
pub struct Savepoint {
    name: String,
    transaction: PgTransaction,
}

impl Savepoint {
    pub(crate) fn new(name: String, transaction: PgTransaction) -> Self {
        Self { name, transaction }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Roll the transaction back to this savepoint.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSavepointName` or the driver error.
    pub async fn rollback_to(&self) -> Result<(), EngineError> {
        validate_savepoint_name(&self.name)?;
        self.transaction
            .simple(&format!("ROLLBACK TO SAVEPOINT {}", self.name))
            .await?;
        Ok(())
    }

    /// Release the savepoint; its name can be used again afterwards.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSavepointName` or the driver error.
    pub async fn release(&self) -> Result<(), EngineError> {
        validate_savepoint_name(&self.name)?;
        self.transaction
            .simple(&format!("RELEASE SAVEPOINT {}", self.name))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_savepoint_name("savepoint_1").is_ok());
        assert!(validate_savepoint_name("my_savepoint2").is_ok());
    }

    #[test]
    fn rejects_injection() {
        let err = validate_savepoint_name("my_savepoint; SELECT * FROM Manager").unwrap_err();
        assert!(matches!(err, EngineError::InvalidSavepointName(_)));
        assert!(validate_savepoint_name("").is_err());
        assert!(validate_savepoint_name("sp-1").is_err());
    }
}
