#![doc = include_str!("../readme.md")]
pub mod data;
pub mod error;
pub mod record;
pub mod route;
pub mod source;

pub use error::Error;

pub mod prelude {
    pub use crate::data::Reference;
    pub use crate::record::{FlightIdentity, RecordHandler, Verdict, WorkItem};
    pub use crate::route::scanner::AirportScanner;
    pub use crate::route::{AirportMatch, ResolvedRoute, RouteCandidate};
    pub use crate::source::framer::{BraceFramer, Framer, LineFramer};

    /// This re-export is necessary to iterate over record streams
    pub use futures_util::stream::StreamExt;
}
