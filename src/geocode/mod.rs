pub mod client;
pub mod error;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod resolver;

// Re-exports for convenience
pub use client::{CandidateSource, GeocodeClient, GeocodeOptions};
pub use error::{GeocodeError, PromptError};
pub use models::{AddressQuery, FeatureCollection, GeocodeCandidate, ResolvedGeocode, StructuredAddress};
pub use prompt::{ConsolePrompt, Selection, SelectionPrompt};
pub use rate_limit::RateLimiter;
pub use resolver::{narrow_candidates, Resolver};
