//! Library linking for precompiled bytecode.
//!
//! Solidity leaves a 40-hex-digit placeholder wherever a contract calls an
//! external library. The compiler artifact records each placeholder as a
//! byte offset and length; linking overwrites those windows in the hex text
//! with the library's deployed address.

use std::collections::BTreeMap;

use alloy::primitives::{hex, Address};
use serde::{Deserialize, Serialize};
use v3_deployer_types::ADDRESS_LENGTH;

use crate::error::LinkError;

/// One placeholder slot inside deployment bytecode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    /// Source file that declares the library
    pub file: String,
    /// Library name, used to look up the resolved address
    pub symbol: String,
    /// Byte offset of the placeholder in the raw bytecode
    pub start: usize,
    /// Length in bytes, always 20 for an address
    pub length: usize,
}

/// Patch every reference in `bytecode` with its resolved library address.
///
/// `bytecode` may carry a leading `0x`; the output keeps whatever prefix the
/// input had and has exactly the same length. Addresses are written as
/// lower-case hex digits.
pub fn link(
    bytecode: &str,
    references: &[LinkReference],
    libraries: &BTreeMap<String, Address>,
) -> Result<String, LinkError> {
    let prefix = if bytecode.starts_with("0x") || bytecode.starts_with("0X") {
        2
    } else {
        0
    };

    // Windows are byte offsets; only ASCII text keeps them on char boundaries
    if let Some(position) = bytecode.bytes().position(|b| !b.is_ascii()) {
        return Err(LinkError::NonAsciiBytecode { position });
    }

    // Check every reference before touching the text so a failure never
    // produces a half-linked result.
    let mut patches = Vec::with_capacity(references.len());
    for reference in references {
        let address = libraries
            .get(&reference.symbol)
            .ok_or_else(|| LinkError::MissingLinkSymbol {
                symbol: reference.symbol.clone(),
            })?;

        if reference.length != ADDRESS_LENGTH {
            return Err(LinkError::InvalidLinkLength {
                symbol: reference.symbol.clone(),
                length: reference.length,
            });
        }

        // Saturating: an absurd offset lands past the end instead of wrapping
        let start = reference.start.saturating_mul(2).saturating_add(prefix);
        let end = start.saturating_add(reference.length * 2);
        if end > bytecode.len() {
            return Err(LinkError::BytecodeBounds {
                symbol: reference.symbol.clone(),
                end,
                len: bytecode.len(),
            });
        }

        patches.push((start, end, hex::encode(address.as_slice())));
    }

    let mut linked = bytecode.to_string();
    for (start, end, digits) in patches {
        linked.replace_range(start..end, &digits);
    }

    Ok(linked)
}

/// Whether the hex text still contains an unpatched placeholder
///
/// Placeholders look like `__$<34 hex digits>$__` (solc >= 0.5) or
/// `__LibraryName____________________________` (older compilers); both
/// start with two underscores, which never appear in linked bytecode.
pub fn has_unlinked_placeholder(bytecode: &str) -> bool {
    bytecode.contains("__")
}
