// SPDX-License-Identifier: MIT
//! Document parsing from its on-disk bytes

use std::sync::Arc;

use bytes::Bytes;

use super::errors::{DocumentError, DocumentResult};
use crate::block::format::{flags, DocHeader, Trailer, COMPANION_MAGIC, HEADER_SIZE, TRAILER_SIZE};
use crate::block::{BlockError, BlockManager, StorageMode};
use crate::compression::CompressionRegistry;
use crate::tree::{yaml, Node};

/// Tree and blocks of a parsed document
#[derive(Debug)]
pub struct DecodedDocument {
    pub tree: Node,
    pub blocks: BlockManager,
    /// Companion file name, for external storage
    pub companion: Option<String>,
}

/// Byte regions of a document file, validated against each other
struct Regions {
    header: DocHeader,
    trailer: Trailer,
    tree_end: usize,
    table_end: usize,
    name_end: usize,
}

fn invalid(message: impl Into<String>) -> DocumentError {
    DocumentError::InvalidHeader(message.into())
}

fn regions(file: &[u8]) -> DocumentResult<Regions> {
    let header = DocHeader::from_bytes(file)?;
    let trailer = Trailer::from_file_end(file)?;
    let trailer_start = (file.len() - TRAILER_SIZE) as u64;

    let trailer_external = u32::from(trailer.flags) & flags::EXTERNAL_BLOCKS != 0;
    if header.is_external() != trailer_external {
        return Err(invalid("header and trailer disagree on block storage"));
    }

    let tree_end = (HEADER_SIZE as u64)
        .checked_add(header.tree_size)
        .filter(|&end| end <= trailer.table_offset)
        .ok_or_else(|| {
            invalid(format!(
                "tree of {} bytes overlaps block table at {}",
                header.tree_size, trailer.table_offset
            ))
        })?;

    let table_end = trailer
        .table_offset
        .checked_add(trailer.table_len())
        .filter(|&end| end <= trailer_start)
        .ok_or_else(|| {
            BlockError::truncated(format!(
                "block table of {} entries at {} runs past the trailer",
                trailer.block_count, trailer.table_offset
            ))
        })?;

    let name_end = table_end + u64::from(trailer.companion_len);
    if name_end != trailer_start {
        return Err(invalid(format!(
            "{} unaccounted bytes between block table and trailer",
            trailer_start as i128 - name_end as i128
        )));
    }
    if !header.is_external() && trailer.companion_len != 0 {
        return Err(invalid("internal document names a companion file"));
    }

    Ok(Regions {
        header,
        trailer,
        tree_end: tree_end as usize,
        table_end: table_end as usize,
        name_end: name_end as usize,
    })
}

/// Reject companion names that would leave the document's directory
pub fn check_companion_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(format!("invalid companion file name '{}'", name));
    }
    Ok(())
}

/// Companion file name recorded in a document, `None` for internal storage
pub fn companion_name(file: &[u8]) -> DocumentResult<Option<String>> {
    let regions = regions(file)?;
    if !regions.header.is_external() {
        return Ok(None);
    }
    let name = std::str::from_utf8(&file[regions.table_end..regions.name_end])
        .map_err(|_| invalid("companion file name is not UTF-8"))?;
    check_companion_name(name).map_err(DocumentError::InvalidHeader)?;
    Ok(Some(name.to_string()))
}

/// Parse a document
///
/// `load_companion` is called with the companion file name when the
/// document stores its blocks externally.
pub fn decode(
    file: Bytes,
    registry: Arc<CompressionRegistry>,
    load_companion: impl FnOnce(&str) -> DocumentResult<Bytes>,
) -> DocumentResult<DecodedDocument> {
    let regions = regions(&file)?;
    let table_offset = regions.trailer.table_offset as usize;

    let text = std::str::from_utf8(&file[HEADER_SIZE..regions.tree_end])
        .map_err(|_| invalid("tree text is not UTF-8"))?;
    let tree = yaml::parse(text)?;
    if tree.as_mapping().is_none() {
        return Err(DocumentError::InvalidTree(
            "document root must be a mapping".to_string(),
        ));
    }

    let table = &file[table_offset..regions.table_end];
    let (blocks, companion) = if regions.header.is_external() {
        let name = companion_name(&file)?
            .ok_or_else(|| invalid("external document without companion name"))?;
        let payloads = load_companion(&name)?;
        if payloads.len() < COMPANION_MAGIC.len() {
            return Err(BlockError::truncated(format!("companion file '{}'", name)).into());
        }
        if &payloads[..COMPANION_MAGIC.len()] != COMPANION_MAGIC {
            return Err(BlockError::InvalidFormat(format!(
                "'{}' is not a companion block file",
                name
            ))
            .into());
        }
        let blocks = BlockManager::from_table(table, &payloads, StorageMode::External, registry)?;
        (blocks, Some(name))
    } else {
        // Internal payloads all sit before the block table
        let payloads = file.slice(..table_offset);
        let blocks = BlockManager::from_table(table, &payloads, StorageMode::Internal, registry)?;
        (blocks, None)
    };

    Ok(DecodedDocument {
        tree,
        blocks,
        companion,
    })
}
