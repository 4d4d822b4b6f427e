pub mod aggregate;
pub mod entities;
pub mod errors;
pub mod ports;

pub use aggregate::aggregate;
pub use entities::*;
pub use errors::{DomainError, Result};
