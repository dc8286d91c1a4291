// Copyright (c) 2024 Botho Foundation

//! Chain export and import as JSON.
//!
//! The export is the plain block array, pretty-printed. Import only
//! parses; the caller decides whether the parsed chain is acceptable.

use super::LedgerError;
use crate::block::Block;

/// Serialize a chain to pretty JSON.
pub fn export_chain(chain: &[Block]) -> Result<String, LedgerError> {
    serde_json::to_string_pretty(chain).map_err(|e| LedgerError::Encoding(e.to_string()))
}

/// Parse a chain previously produced by [`export_chain`].
pub fn parse_chain(json: &str) -> Result<Vec<Block>, LedgerError> {
    serde_json::from_str(json).map_err(|e| LedgerError::Encoding(e.to_string()))
}
