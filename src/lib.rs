//! Personalized semantic search over marketplace listings.
//!
//! Listings are embedded in batches by a background worker and stored in a vector index.
//! Searches are ranked by a query embedding, a user's interest vector built from their
//! activity, or a site-wide fallback vector, degrading between them when a dependency fails.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod pipeline;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use pipeline::Pipeline;
