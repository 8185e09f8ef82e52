//! HTTP gateway exposing Google Drive through plain paths.
//!
//! `GET` streams a file or lists a folder, `PUT` creates or replaces a
//! file (creating missing folders) and `DELETE` removes a file. Paths are
//! resolved through `drivegate-drive`; upstream responses are relayed
//! with their status, headers and body.

pub mod config;
pub mod listing;
pub mod operations;
pub mod response;
pub mod router;

pub use config::GatewayConfig;
pub use listing::ListingEntry;
pub use operations::{DriveGateway, ListingMode};
pub use router::build_router;
