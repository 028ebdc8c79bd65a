//! bencao-common: Shared entity types, errors, and the herb compatibility
//! tables used across all Bencao crates.

pub mod compat;
pub mod entities;
pub mod error;

// Re-export commonly used types
pub use entities::{
    Acupoint, Contraindication, EntityKind, Formula, Herb, Meridian, MeridianType,
    NormalizedRecord, Row,
};
pub use error::{UnknownKind, ValidationError};
