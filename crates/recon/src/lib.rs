//! `starmerge-recon`: catalog reconciliation and merge engine for
//! multi-planet host stars.
//!
//! Pure engine crate: receives pre-fetched source text and a
//! cross-identification service, returns the reconciled registry.
//! No network or filesystem dependencies.

pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod index;
pub mod ingest;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod names;
pub mod registry;

pub use config::{OverrideTable, ReconConfig};
pub use coords::{Axis, CoordPair, Sexagesimal};
pub use engine::{execute, run, Pipeline};
pub use error::ReconError;
pub use index::{CatalogIndex, CrossIdEntry, CrossIdRow};
pub use matcher::{CrossIdService, LookupError, Matcher, OfflineCrossId};
pub use merge::MergePolicy;
pub use model::{ReconEvent, ReconInput, ReconResult, SourceId, StarRecord};
pub use names::{NormalizedName, Normalizer};
pub use registry::{StarId, StarRegistry};
