pub mod loader;
pub mod schema;

pub use loader::{rules_from_path, rules_from_str, spec_from_path, spec_from_str, ConfigError};
pub use schema::{
    Fallback, Metadata, PatchDefinition, PatchSpec, Rewrite, RulesFile, SubstitutionRule,
    ValidationError, ValidationIssue,
};
