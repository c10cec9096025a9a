//! Catalog parsing and resolution
//!
//! A catalog is a TOML document describing frames and signals per protocol
//! namespace. It is parsed into a raw serde model, then resolved once into an
//! immutable frame table.

pub mod model;
pub mod mux;
pub mod raw;
pub mod resolver;
pub mod store;

pub use model::{
    Catalog, CatalogMeta, CatalogStats, HeaderField, ModbusRegister, ProtocolConfig,
    ResolvedFrame, ResolvedSignal,
};
pub use mux::{match_case, CaseKey, MuxCase, MuxNode, MAX_MUX_DEPTH};
pub use raw::{Confidence, RawCatalog, RegisterType};
pub use resolver::{parse_frame_id, resolve, resolve_raw, CatalogResolver};
pub use store::{CatalogStore, LoadTicket};

use crate::types::Result;
use std::path::Path;

/// Read and resolve a catalog file
///
/// Parse errors carry the file path.
pub fn load_file(path: &Path) -> Result<Catalog> {
    log::info!("Loading catalog: {:?}", path);
    let text = std::fs::read_to_string(path)?;
    let catalog = resolve(&text).map_err(|e| e.with_path(path))?;
    log::info!("Catalog loaded successfully: {:?}", path);
    Ok(catalog)
}
