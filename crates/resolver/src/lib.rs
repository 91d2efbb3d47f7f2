//! Symbolic Resolver: resolves symbolic parameter tokens to addresses,
//! values (direct or rule-computed), labels, and units, on top of the
//! Store, Asset Catalog, and i18n Resolver.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/param_resolver.py`.

pub mod resolver;
pub mod ruleengine;
pub mod transform;

pub use resolver::{MappingDescriptor, ParamResolver, ResolvedValue, SymbolDescriptor};
pub use ruleengine::{evaluate_computed_value, normalize_rule_output, read_raw_value};
pub use transform::{apply_transform, Val};
