//! Menu Processor: turns a raw menu-chunk route array into a permission-
//! filtered, token-resolved `MenuResult`, with panel-grouping helpers
//! for the upstream app's "core-only" and "all-panels" display modes.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/menu.py`
//! and `models/menu_manager.py`.

pub mod manager;
pub mod model;
pub mod processor;

pub use manager::{MenuManager, PanelGroup, RawMenuData};
pub use model::{MenuMeta, MenuParameter, MenuParameters, MenuResult, MenuRoute};
pub use processor::{detect_permission_prefixes, extract_token, normalize_permission, process_raw_menu};
