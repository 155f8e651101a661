// SPDX-License-Identifier: MIT
//! Document serialization and atomic replacement on disk

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::atomic::AtomicFile;
use super::errors::{DocumentError, DocumentResult};
use super::reader;
use crate::block::format::{flags, DocHeader, Trailer, COMPANION_MAGIC, HEADER_SIZE, TRAILER_SIZE};
use crate::block::{BlockError, BlockManager, StorageMode};
use crate::tree::{yaml, Node};

/// Extension of companion block files
pub const COMPANION_EXTENSION: &str = "blocks";

/// Serialized bytes of a document and, for external storage, its companion
#[derive(Debug, Clone)]
pub struct EncodedDocument {
    pub main: Vec<u8>,
    pub companion: Option<Vec<u8>>,
}

/// Fail if the tree points at a block the manager does not hold
pub fn check_references(tree: &Node, blocks: &BlockManager) -> DocumentResult<()> {
    if let Some(&index) = tree
        .block_refs()
        .iter()
        .find(|&&index| index as usize >= blocks.len())
    {
        return Err(BlockError::BlockIndexOutOfRange {
            index,
            len: blocks.len(),
        }
        .into());
    }
    Ok(())
}

/// Serialize `tree` and `blocks`
///
/// External storage needs `companion_name`, the file name recorded in the
/// document for the companion payload file.
pub fn encode(
    tree: &Node,
    blocks: &BlockManager,
    companion_name: Option<&str>,
) -> DocumentResult<EncodedDocument> {
    check_references(tree, blocks)?;
    let text = yaml::emit(tree)?;
    let external = blocks.storage_mode() == StorageMode::External;
    let doc_flags = if external { flags::EXTERNAL_BLOCKS } else { 0 };

    let mut main = Vec::with_capacity(HEADER_SIZE + text.len() + TRAILER_SIZE);
    DocHeader::new(doc_flags, text.len() as u64).write_to_buffer(&mut main);
    main.extend_from_slice(text.as_bytes());

    let (table, companion, name) = if external {
        let name = companion_name.ok_or_else(|| {
            DocumentError::InvalidConfig(
                "external block storage needs a companion file name".to_string(),
            )
        })?;
        reader::check_companion_name(name).map_err(DocumentError::InvalidConfig)?;

        let mut companion =
            Vec::with_capacity(COMPANION_MAGIC.len() + blocks.payload_size() as usize);
        companion.extend_from_slice(COMPANION_MAGIC);
        blocks.write_payloads(&mut companion)?;
        let table = blocks.serialize_layout(COMPANION_MAGIC.len() as u64);
        (table, Some(companion), name.as_bytes())
    } else {
        let payload_offset = main.len() as u64;
        blocks.write_payloads(&mut main)?;
        (blocks.serialize_layout(payload_offset), None, &[][..])
    };

    let trailer = Trailer {
        table_offset: main.len() as u64,
        block_count: u32::try_from(blocks.len())
            .map_err(|_| BlockError::InvalidFormat("block count exceeds u32".to_string()))?,
        flags: doc_flags as u16,
        companion_len: u32::try_from(name.len())
            .map_err(|_| DocumentError::InvalidConfig("companion name too long".to_string()))?,
    };
    main.extend_from_slice(&table);
    main.extend_from_slice(name);
    trailer.write_to_buffer(&mut main);

    debug!(
        tree_bytes = text.len(),
        blocks = blocks.len(),
        file_bytes = main.len(),
        external,
        "encoded document"
    );

    Ok(EncodedDocument { main, companion })
}

/// Path of companion `name` for the document at `document`
pub fn companion_path(document: &Path, name: &str) -> PathBuf {
    match document.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn default_companion_name(document: &Path) -> String {
    let stem = document
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{}.{}", stem, COMPANION_EXTENSION)
}

/// Companion name for a new write of `document`
///
/// The default `<stem>.blocks` is used only when no file exists under that
/// name. Another document sharing the stem (`doc.bdoc` next to `doc.out`) or
/// the file being replaced may still depend on it, so an existing companion
/// is never overwritten.
fn next_companion_name(document: &Path, previous: Option<&str>) -> String {
    let name = default_companion_name(document);
    if previous != Some(name.as_str()) && !companion_path(document, &name).exists() {
        return name;
    }
    let stem = name.trim_end_matches(&format!(".{}", COMPANION_EXTENSION));
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}.{}.{}", stem, &suffix[..8], COMPANION_EXTENSION)
}

/// Companion name recorded by the document currently at `path`, if any
fn existing_companion(path: &Path) -> Option<String> {
    let file = fs::read(path).ok()?;
    reader::companion_name(&file).ok().flatten()
}

/// A written but uncommitted document
///
/// Everything is on disk in temp files; [`commit`](Self::commit) renames
/// them into place, companion first. Dropping it instead leaves every
/// existing file untouched.
#[derive(Debug)]
pub struct PendingWrite {
    main: AtomicFile,
    companion: Option<AtomicFile>,
    stale_companion: Option<PathBuf>,
}

impl PendingWrite {
    pub fn prepare(
        path: &Path,
        tree: &Node,
        blocks: &BlockManager,
        durable: bool,
    ) -> DocumentResult<Self> {
        let previous = existing_companion(path);
        let companion_name = match blocks.storage_mode() {
            StorageMode::Internal => None,
            StorageMode::External => Some(next_companion_name(path, previous.as_deref())),
        };

        let encoded = encode(tree, blocks, companion_name.as_deref())?;
        let companion = match (&companion_name, &encoded.companion) {
            (Some(name), Some(bytes)) => Some(AtomicFile::create(
                &companion_path(path, name),
                bytes,
                durable,
            )?),
            _ => None,
        };
        let main = AtomicFile::create(path, &encoded.main, durable)?;

        let stale_companion = previous
            .filter(|previous| companion_name.as_deref() != Some(previous.as_str()))
            .map(|previous| companion_path(path, &previous));

        Ok(Self {
            main,
            companion,
            stale_companion,
        })
    }

    /// Final location of the document
    pub fn target(&self) -> &Path {
        self.main.target()
    }

    /// Final location of the companion file, for external storage
    pub fn companion_target(&self) -> Option<&Path> {
        self.companion.as_ref().map(AtomicFile::target)
    }

    /// Temp files currently holding the new content
    pub fn temp_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.main.temp_path()];
        if let Some(companion) = &self.companion {
            paths.push(companion.temp_path());
        }
        paths
    }

    pub fn commit(self) -> DocumentResult<()> {
        let Self {
            main,
            companion,
            stale_companion,
        } = self;

        if let Some(companion) = companion {
            companion.commit()?;
        }
        main.commit()?;

        // The replaced document's companion is unreferenced now
        if let Some(stale) = stale_companion {
            if let Err(e) = fs::remove_file(&stale) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove stale companion {:?}: {}", stale, e);
                }
            }
        }
        Ok(())
    }
}
