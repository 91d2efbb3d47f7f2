//! Asset Catalog: discovers the BragerOne web-app's hashed bundle graph
//! and parses parameter maps, i18n namespaces, unit descriptors, and
//! module-menu chunks out of it without hardcoding any identifier.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/assets_model.py`
//! and `parsers/index_resolver.py`, restructured as the teacher's HTTP
//! and caching idioms (`crates/http`, `parking_lot::Mutex`-guarded caches).

pub mod catalog;
pub mod discovery;
pub mod jsliteral;
pub mod parammap;
pub mod units;

pub use catalog::AssetCatalog;
pub use discovery::{AssetRef, IndexState, InlineCandidate};
pub use parammap::{ParamMap, ParamPaths, RegisterSelector};
pub use units::UnitDescriptor;
