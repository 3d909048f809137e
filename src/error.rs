//! Rich diagnostic error types for the career-compass engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Outcomes that the pipeline treats as
//! normal (no mentions, insufficient history, no market data) are values, not
//! errors, and never show up here.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::seeds::SeedError;

/// Top-level error type for the career-compass engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum CompassError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Posting(#[from] PostingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Demand(#[from] DemandError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Gap(#[from] GapError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Seed(#[from] SeedError),
}

// ---------------------------------------------------------------------------
// Posting errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PostingError {
    #[error("posting from {source_name} has neither a title nor a description")]
    #[diagnostic(
        code(compass::posting::empty),
        help(
            "A posting needs at least a title or a description to be ingested. \
             Check the scraping collaborator's output for this source."
        )
    )]
    Empty { source_name: String },

    #[error("posting source must not be empty")]
    #[diagnostic(
        code(compass::posting::no_source),
        help("Every posting must name the job board or feed it was fetched from.")
    )]
    MissingSource,
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("unknown skill id {skill_id}")]
    #[diagnostic(
        code(compass::ontology::unknown_skill),
        help(
            "The id was never allocated by this ontology. \
             List known skills with `compass ontology show` and retry with a valid id."
        )
    )]
    UnknownSkill { skill_id: u64 },

    #[error("cannot merge skill {skill_id} into itself")]
    #[diagnostic(
        code(compass::ontology::self_merge),
        help(
            "Both ids resolve to the same surviving node, so they are already merged. \
             No action needed."
        )
    )]
    SelfMerge { skill_id: u64 },

    #[error("edge from skill {skill_id} to itself")]
    #[diagnostic(
        code(compass::ontology::self_loop),
        help("Both endpoints resolve to the same canonical skill. Self-edges carry no information.")
    )]
    SelfLoop { skill_id: u64 },

    #[error("edge weight {weight} is outside [0.0, 1.0]")]
    #[diagnostic(
        code(compass::ontology::invalid_weight),
        help("Edge weights are relevance scores and must lie between 0.0 and 1.0 inclusive.")
    )]
    InvalidWeight { weight: f32 },

    #[error("skill id allocator exhausted")]
    #[diagnostic(
        code(compass::ontology::exhausted),
        help("The 64-bit id space is exhausted. Check for an id allocation loop.")
    )]
    AllocatorExhausted,

    #[error("skill term must not be blank")]
    #[diagnostic(
        code(compass::ontology::blank_term),
        help("Raw terms are trimmed before resolution; a blank term cannot name a skill.")
    )]
    BlankTerm,
}

// ---------------------------------------------------------------------------
// Demand errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DemandError {
    #[error("period {period} is closed (closed through {closed_through})")]
    #[diagnostic(
        code(compass::demand::period_closed),
        help(
            "Closed periods are immutable so historical forecasts stay reproducible. \
             Late postings for a closed period require a full re-aggregation pass."
        )
    )]
    PeriodClosed { period: i64, closed_through: i64 },

    #[error("period width must be at least one day, got {days}")]
    #[diagnostic(
        code(compass::demand::invalid_width),
        help("Set `demand.period_days` to a positive number of days (7 for weekly buckets).")
    )]
    InvalidWidth { days: i64 },
}

// ---------------------------------------------------------------------------
// Forecast errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ForecastError {
    #[error("invalid forecast configuration: {message}")]
    #[diagnostic(
        code(compass::forecast::invalid_config),
        help("Check the [forecast] section of the configuration. {message}")
    )]
    InvalidConfig { message: String },
}

// ---------------------------------------------------------------------------
// Gap errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GapError {
    #[error("target role must not be blank")]
    #[diagnostic(
        code(compass::gap::blank_role),
        help("Pass a role label such as \"data engineer\".")
    )]
    BlankRole,

    #[error("hours per week must be positive, got {hours}")]
    #[diagnostic(
        code(compass::gap::invalid_budget),
        help("A learning plan needs a positive weekly time budget.")
    )]
    InvalidBudget { hours: f32 },

    #[error("current and target role are both \"{role}\"")]
    #[diagnostic(
        code(compass::gap::same_role),
        help("A transition needs two different roles; use `compass gap` for a single role.")
    )]
    SameRole { role: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(compass::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(compass::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try a fresh data directory and re-ingest."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(compass::store::serde),
        help(
            "Failed to serialize or deserialize stored data. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },
}

/// Convenience alias for functions returning career-compass results.
pub type CompassResult<T> = std::result::Result<T, CompassError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ontology_error_converts_to_compass_error() {
        let err = OntologyError::UnknownSkill { skill_id: 7 };
        let top: CompassError = err.into();
        assert!(matches!(
            top,
            CompassError::Ontology(OntologyError::UnknownSkill { skill_id: 7 })
        ));
    }

    #[test]
    fn demand_error_converts_to_compass_error() {
        let err = DemandError::PeriodClosed {
            period: 3,
            closed_through: 5,
        };
        let top: CompassError = err.into();
        assert!(matches!(top, CompassError::Demand(DemandError::PeriodClosed { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = DemandError::PeriodClosed {
            period: 3,
            closed_through: 5,
        };
        let msg = format!("{err}");
        assert!(msg.contains("period 3"));
        assert!(msg.contains("through 5"));
    }
}
