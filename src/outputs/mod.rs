//! Everything written after ingestion: the snapshot store and reports.
//!
//! # Submodules
//!
//! - [`store`]: Append-only, run-keyed JSON payloads under `download_location`
//! - [`markdown`]: Depth-first Markdown outline of a stored snapshot
//!
//! # Output Structure
//!
//! ```text
//! download_location/
//! ├── 2015-05-01T101500/
//! │   ├── feed.json
//! │   └── snapshot.json
//! └── 2015-05-02T080000/
//!     └── snapshot.json
//! ```

pub mod markdown;
pub mod store;
