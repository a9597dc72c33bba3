use crate::contracts::error::SequenceError;
use crate::contracts::store::SequenceCounter;

/// Issues formatted, unique document numbers for named sequences.
///
/// # Invariants
/// - For one name, every returned numeric component is strictly greater
///   than any previously returned one, and none is ever returned twice.
/// - Different names are fully independent.
/// - A number is only returned after the incremented counter is persisted.
pub trait SequenceGenerator: Send + Sync {
    /// Returns the next formatted number for `name`, creating the counter
    /// on first use.
    fn next(&self, name: &str) -> Result<String, SequenceError>;

    /// Returns the persisted counter for `name` without incrementing or
    /// creating it.
    fn current(&self, name: &str) -> Result<Option<SequenceCounter>, SequenceError>;
}
