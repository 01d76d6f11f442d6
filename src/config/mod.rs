//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → flags.rs (command-line overrides)
//!     → validation.rs (semantic checks)
//!     → FrontendConfig (validated, immutable)
//!     → query_range section drives pipeline assembly
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the pipeline is assembled from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod flags;
pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::CacheConfig;
pub use schema::FrontendConfig;
pub use schema::LimitsConfig;
pub use schema::QueryRangeConfig;
pub use schema::ResultsCacheConfig;
