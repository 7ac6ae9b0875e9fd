use thiserror::Error;

/// Canonical CSQL error taxonomy used across crates.
///
/// Classification guidance:
/// - [`CsqlError::UnresolvedReference`]: a table, column, or function name has
///   no catalog entry (or no overload matching the supplied argument types)
/// - [`CsqlError::AmbiguousReference`]: a name matches more than one candidate
///   and the statement does not disambiguate
/// - [`CsqlError::DuplicateDefinition`]: registering a definition that already
///   exists without asking for replacement
/// - [`CsqlError::NotFound`]: explicit delete/lookup of a missing source or
///   function
/// - [`CsqlError::NotExecutable`]: a function body failed the executability
///   probe for its declared language
/// - [`CsqlError::UnsupportedOperator`]: a logical operator with no physical
///   lowering on the streaming substrate
/// - [`CsqlError::ForeignExecution`]: a foreign-script invocation failed; this
///   is caught at the callable boundary and downgraded to a null result
/// - [`CsqlError::Planning`]: query shape/name/type issues discovered before
///   execution
/// - [`CsqlError::Execution`]: runtime row evaluation failures after planning
///   succeeded
/// - [`CsqlError::InvalidConfig`]: catalog/config contract violations
/// - [`CsqlError::Io`]: raw filesystem/network IO failures from std APIs
#[derive(Debug, Error)]
pub enum CsqlError {
    /// A referenced table, column, or function could not be resolved.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A reference matched more than one candidate without disambiguation.
    ///
    /// Examples:
    /// - a column name present in both sides of a join, used unqualified
    /// - a function call coercible to more than one overload at equal cost
    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// A definition with the same identity already exists.
    #[error("duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// Explicit removal or lookup of something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A function body failed the executability probe for its language.
    #[error("body is not executable as {language}: {reason}")]
    NotExecutable { language: String, reason: String },

    /// A logical operator has no lowering onto the streaming substrate.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A foreign-script invocation failed.
    ///
    /// Never propagates past the callable boundary: `evaluate` converts it to
    /// a null result plus a diagnostic event.
    #[error("foreign execution error: {0}")]
    ForeignExecution(String),

    /// Query planning/analyzer failures.
    ///
    /// Examples:
    /// - type mismatch in expressions or join keys
    /// - statement shapes outside the supported subset
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime evaluation failures after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Invalid or inconsistent configuration state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard CSQL result alias.
pub type Result<T> = std::result::Result<T, CsqlError>;
