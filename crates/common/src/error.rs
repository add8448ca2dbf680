use thiserror::Error;

/// Canonical pdq error taxonomy used across crates.
///
/// Classification guidance:
/// - [`PdqError::NonRecoverable`]: the plan explicitly asked for a worker the
///   scheduler never offered; retrying the same id cannot succeed
/// - [`PdqError::Scheduler`]: no eligible worker of the needed kind exists right
///   now; a later attempt may succeed once cluster state changes
/// - [`PdqError::InvalidConfig`]: session/scheduler/environment contract violations
#[derive(Debug, Error)]
pub enum PdqError {
    /// Invalid or inconsistent configuration.
    ///
    /// Examples:
    /// - `parallel_exec_instance_num` below 1
    /// - a zero sink DOP divisor
    /// - unparseable `PDQ_*` environment values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An explicitly requested worker is not part of the eligible pool.
    ///
    /// The caller (plan executor) decides whether to abort or replan; it must
    /// not retry the same worker id.
    #[error("non-recoverable: {0}")]
    NonRecoverable(String),

    /// Selection found zero eligible workers of the needed kind.
    ///
    /// The message is the operator-facing cluster-health diagnostic and is
    /// rendered verbatim.
    #[error("{0}")]
    Scheduler(String),
}

impl PdqError {
    /// Whether a caller may retry the same request after cluster state changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PdqError::Scheduler(_))
    }

    pub fn is_non_recoverable(&self) -> bool {
        matches!(self, PdqError::NonRecoverable(_))
    }

    /// Short stable label, used as a metrics label value.
    pub fn kind_label(&self) -> &'static str {
        match self {
            PdqError::InvalidConfig(_) => "invalid_config",
            PdqError::NonRecoverable(_) => "non_recoverable",
            PdqError::Scheduler(_) => "scheduler",
        }
    }
}

/// Standard pdq result alias.
pub type Result<T> = std::result::Result<T, PdqError>;
