//! Feature extraction and discretization.
//!
//! A request is summarized into a fixed-length numeric [`FeatureVector`]
//! (one slot carries the externally supplied attack score, the rest are
//! syntactic counts and ratios), then bucketed into a bounded categorical
//! [`State`] that keys the policy's value table.
//!
//! ## Structure
//! - `layout`: authoritative feature ordering + version + CRC32 hash
//! - `vector`: the versioned fixed-length vector
//! - `extract`: Request -> FeatureVector (pure, never aborts the pipeline)
//! - `discretize`: FeatureVector -> State (total and deterministic)

pub mod discretize;
pub mod extract;
pub mod layout;
pub mod vector;

pub use discretize::{BinConfig, Discretizer, State};
pub use extract::{build, Syntactic};
pub use layout::{layout_hash, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};
pub use vector::FeatureVector;
