mod embedding;
mod jobs;
mod listing;
mod payload;
mod search;

pub use embedding::Embedding;
pub use jobs::{ListingJob, UserJob};
pub use listing::{Listing, ListingId, ListingRef, Location, ParentCompany, UserId};
pub use payload::{GeoPoint, Payload, PayloadValue};
pub use search::{
    decode_cursor, encode_cursor, FieldCondition, FieldMatch, GeoBoundingBox, SearchFilter,
    SearchHit, SearchPage, SearchQuery, VehicleFit,
};
