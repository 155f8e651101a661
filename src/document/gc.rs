// SPDX-License-Identifier: MIT
//! Garbage collection of orphaned blocks
//!
//! Compaction rewrites a document so that it holds exactly the blocks its
//! tree still references, renumbered densely in their original order. The
//! output is built completely in temp files next to the destination and only
//! then renamed into place, so the input is never modified by a failed run.
//! Writing over the input path is supported.
//!
//! The output never stores more payload bytes than the input's live blocks.
//! Copying stored bytes verbatim meets that trivially; a recompression that
//! would grow the payload fails with [`DocumentError::CompactionGrew`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::errors::{DocumentError, DocumentResult};
use super::writer::PendingWrite;
use super::Document;
use crate::block::{BlockResult, IndexRemap};
use crate::compression::{CompressionId, CompressionRegistry};
use crate::config::DocumentConfig;
use crate::tags::TagRegistry;

/// Outcome of a document compaction
#[derive(Debug, Clone, Serialize)]
pub struct CompactionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub blocks_before: usize,
    pub blocks_after: usize,
    /// Stored payload bytes of the input
    pub stored_bytes_before: u64,
    /// Stored payload bytes of the input's live blocks
    pub live_bytes_before: u64,
    /// Stored payload bytes of the output
    pub stored_bytes_after: u64,
    /// Compression applied to every surviving block, `None` if the stored
    /// bytes were carried over as they were
    pub recompressed_with: Option<String>,
    /// Old block index to new block index for every surviving block
    pub remap: IndexRemap,
}

impl CompactionReport {
    pub fn blocks_removed(&self) -> usize {
        self.blocks_before.saturating_sub(self.blocks_after)
    }

    /// Payload bytes freed
    pub fn bytes_reclaimed(&self) -> u64 {
        self.stored_bytes_before.saturating_sub(self.stored_bytes_after)
    }

    pub fn has_removals(&self) -> bool {
        self.blocks_removed() > 0
    }

    /// Blocks whose index changed
    pub fn renumbered(&self) -> usize {
        self.remap.iter().filter(|(old, new)| old != new).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Compaction completed: {} of {} blocks kept ({} removed, {} renumbered), {} bytes reclaimed",
            self.blocks_after,
            self.blocks_before,
            self.blocks_removed(),
            self.renumbered(),
            self.bytes_reclaimed()
        )
    }
}

/// A compaction whose output is fully written but not yet in place
///
/// Dropping it discards the output and leaves every existing file as it was.
#[derive(Debug)]
pub struct PreparedCompaction {
    pending: PendingWrite,
    report: CompactionReport,
}

impl PreparedCompaction {
    pub fn report(&self) -> &CompactionReport {
        &self.report
    }

    /// Temp files holding the compacted output
    pub fn temp_paths(&self) -> Vec<&Path> {
        self.pending.temp_paths()
    }

    /// Move the output into place
    pub fn commit(self) -> DocumentResult<CompactionReport> {
        let Self { pending, report } = self;
        pending
            .commit()
            .map_err(|source| abort(&report.input, source))?;
        info!("{}", report.summary());
        Ok(report)
    }
}

fn abort(input: &Path, source: DocumentError) -> DocumentError {
    warn!("Compaction of {:?} aborted: {}", input, source);
    DocumentError::CompactionAborted {
        input: input.to_path_buf(),
        source: Box::new(source),
    }
}

/// Compact `input` into `output`, keeping only blocks the tree references
///
/// With `compression_override` every surviving block is decompressed,
/// verified and recompressed with that codec; without it stored bytes are
/// copied verbatim. The output keeps the input's block storage mode.
pub fn compact_document(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    compression_override: Option<CompressionId>,
) -> DocumentResult<CompactionReport> {
    compact_document_with(input, output, compression_override, &DocumentConfig::default())
}

/// [`compact_document`] with explicit write configuration
pub fn compact_document_with(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    compression_override: Option<CompressionId>,
    config: &DocumentConfig,
) -> DocumentResult<CompactionReport> {
    prepare_compaction(input, output, compression_override, config)?.commit()
}

/// Build the compacted output in temp files without committing it
pub fn prepare_compaction(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    compression_override: Option<CompressionId>,
    config: &DocumentConfig,
) -> DocumentResult<PreparedCompaction> {
    prepare_compaction_with_codecs(
        input,
        output,
        compression_override,
        config,
        Arc::new(CompressionRegistry::new()),
    )
}

/// [`prepare_compaction`] for documents using codecs outside the built-in
/// compression registry
pub fn prepare_compaction_with_codecs(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    compression_override: Option<CompressionId>,
    config: &DocumentConfig,
    compression: Arc<CompressionRegistry>,
) -> DocumentResult<PreparedCompaction> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!(
        input = ?input,
        output = ?output,
        recompress = ?compression_override,
        "Starting compaction"
    );

    build(input, output, compression_override, config, compression)
        .map_err(|source| abort(input, source))
}

fn build(
    input: &Path,
    output: &Path,
    compression_override: Option<CompressionId>,
    config: &DocumentConfig,
    compression: Arc<CompressionRegistry>,
) -> DocumentResult<PreparedCompaction> {
    // Tags are never decoded during compaction, only their block references
    // are followed, so no tag codecs are needed
    let mut document = Document::open_with_codecs(
        input,
        config.clone(),
        Arc::new(TagRegistry::new()),
        compression,
    )?;

    let before = document.stats();
    let live = document.live_blocks();
    let live_bytes_before = live
        .iter()
        .map(|&index| document.blocks().get(index).map(|block| block.stored_size()))
        .sum::<BlockResult<u64>>()?;

    let remap = document.compact(compression_override)?;
    let after = document.stats();
    if after.stored_bytes > live_bytes_before {
        return Err(DocumentError::CompactionGrew {
            live: live_bytes_before,
            output: after.stored_bytes,
        });
    }
    let pending = document.prepare_write(output)?;

    let report = CompactionReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        blocks_before: before.block_count,
        blocks_after: after.block_count,
        stored_bytes_before: before.stored_bytes,
        live_bytes_before,
        stored_bytes_after: after.stored_bytes,
        recompressed_with: compression_override
            .map(|id| document.blocks().registry().display_name(Some(id))),
        remap,
    };

    Ok(PreparedCompaction { pending, report })
}
