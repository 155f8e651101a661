// SPDX-License-Identifier: MIT
//! Document write/read tests against real files

use std::fs;

use blockdoc::block::format::{DocHeader, TableEntry, Trailer, TABLE_ENTRY_SIZE};
use blockdoc::tags::{BigInt, Complex, DType, NdArray, Value};
use blockdoc::{
    BlockError, CompressionId, Document, DocumentConfig, DocumentError, Node, StorageMode,
};
use tempfile::TempDir;

fn ramp(len: usize) -> NdArray {
    NdArray::from_f64(&(0..len).map(|i| i as f64 * 0.5).collect::<Vec<_>>())
}

fn sample_document(config: DocumentConfig) -> Document {
    let mut doc = Document::with_config(config).unwrap();
    doc.insert("title", "sample run").unwrap();
    doc.insert("count", 42i64).unwrap();
    doc.insert("ramp", ramp(512)).unwrap();
    doc.insert(
        "image",
        NdArray::new(DType::Uint8, vec![16, 16], vec![7u8; 256]).unwrap(),
    )
    .unwrap();
    doc.insert("big", BigInt::from(1u128 << 100)).unwrap();
    doc.insert("negative_big", BigInt::from(-(1i128 << 90) - 12345))
        .unwrap();
    doc.insert("z", Complex::new(3.0, -4.0)).unwrap();
    doc
}

/// Table entry `index` of the document file at `bytes`
fn table_entry(bytes: &[u8], index: usize) -> TableEntry {
    let trailer = Trailer::from_file_end(bytes).unwrap();
    let start = trailer.table_offset as usize + index * TABLE_ENTRY_SIZE;
    TableEntry::from_bytes(&bytes[start..start + TABLE_ENTRY_SIZE]).unwrap()
}

#[test]
fn internal_document_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");

    let doc = sample_document(DocumentConfig::default());
    doc.write_to(&path).unwrap();

    let reread = Document::open(&path).unwrap();
    assert_eq!(reread.to_value().unwrap(), doc.to_value().unwrap());
    assert_eq!(reread.blocks().len(), doc.blocks().len());
    assert_eq!(reread.config().storage, StorageMode::Internal);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

    let text_start = &fs::read(&path).unwrap()[..64];
    assert_eq!(&text_start[..8], b"BLKDOC\r\n");
}

#[test]
fn tree_text_is_readable_yaml() {
    let doc = sample_document(DocumentConfig::default());
    let bytes = doc.encode(None).unwrap().main;
    let header = DocHeader::from_bytes(&bytes).unwrap();
    let text = std::str::from_utf8(&bytes[32..32 + header.tree_size as usize]).unwrap();

    assert!(text.contains("title: sample run"));
    assert!(text.contains("!core/integer-1.0.0"));
    assert!(text.contains("!core/ndarray-1.0.0"));
    assert!(text.contains("!core/complex-1.0.0 3.0-4.0j"));
    assert!(text.contains("source: !block 0"));
}

#[test]
fn external_document_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    let config = DocumentConfig {
        storage: StorageMode::External,
        compression: "zlib".to_string(),
        ..Default::default()
    };

    let doc = sample_document(config);
    doc.write_to(&path).unwrap();

    let companion = dir.path().join("run.blocks");
    assert!(companion.exists());
    assert_eq!(&fs::read(&companion).unwrap()[..8], b"BLKDATA\0");

    let reread = Document::open(&path).unwrap();
    assert_eq!(reread.config().storage, StorageMode::External);
    assert_eq!(reread.to_value().unwrap(), doc.to_value().unwrap());
    assert!(reread
        .blocks()
        .blocks()
        .iter()
        .all(|block| block.compression() == Some(CompressionId::ZLIB)));
}

#[test]
fn rewriting_external_document_replaces_companion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    let config = DocumentConfig {
        storage: StorageMode::External,
        ..Default::default()
    };

    sample_document(config).write_to(&path).unwrap();
    let mut doc = Document::open(&path).unwrap();
    doc.insert("extra", ramp(64)).unwrap();
    doc.write_to(&path).unwrap();

    // The original companion is replaced by a freshly named one
    let companions: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".blocks"))
        .collect();
    assert_eq!(companions.len(), 1);
    assert_ne!(companions[0], "run.blocks");

    let reread = Document::open(&path).unwrap();
    assert_eq!(reread.get("extra").unwrap(), Some(Value::Array(ramp(64))));
}

#[test]
fn missing_companion_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    let config = DocumentConfig {
        storage: StorageMode::External,
        ..Default::default()
    };
    sample_document(config).write_to(&path).unwrap();
    fs::remove_file(dir.path().join("run.blocks")).unwrap();

    assert!(matches!(Document::open(&path), Err(DocumentError::Io(_))));
}

#[test]
fn corrupt_payload_only_affects_its_block() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    let config = DocumentConfig {
        compression: "zlib".to_string(),
        ..Default::default()
    };
    let doc = sample_document(config);
    doc.write_to(&path).unwrap();

    // Block 0 holds "ramp"; flip a byte inside its stored payload
    let mut bytes = fs::read(&path).unwrap();
    let entry = table_entry(&bytes, 0);
    bytes[entry.offset as usize + entry.stored_size as usize / 2] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let reread = Document::open(&path).unwrap();
    let error = reread.get("ramp").unwrap_err();
    assert!(matches!(
        error.block_error(),
        Some(BlockError::IntegrityError { index: 0, .. })
    ));
    assert!(matches!(
        reread.blocks().read(0),
        Err(BlockError::IntegrityError { .. })
    ));

    for index in 1..reread.blocks().len() as u32 {
        assert_eq!(reread.blocks().read(index).unwrap(), doc.blocks().read(index).unwrap());
    }
    assert_eq!(reread.get("image").unwrap(), doc.get("image").unwrap());
}

/// Encoded zlib-compressed sample document with table entry 0 edited by `edit`
fn with_edited_entry(edit: impl FnOnce(&mut [u8])) -> (Document, Vec<u8>) {
    let config = DocumentConfig {
        compression: "zlib".to_string(),
        ..Default::default()
    };
    let doc = sample_document(config);
    let mut bytes = doc.encode(None).unwrap().main;
    let table_offset = Trailer::from_file_end(&bytes).unwrap().table_offset as usize;
    edit(&mut bytes[table_offset..table_offset + TABLE_ENTRY_SIZE]);
    (doc, bytes)
}

#[test]
fn corrupt_raw_size_is_a_typed_error() {
    // Top byte of the raw size, then the bottom one
    for (at, flip) in [(23usize, 0x80u8), (16, 0x01)] {
        let (doc, bytes) = with_edited_entry(|entry| entry[at] ^= flip);

        let reread = Document::from_bytes(bytes).unwrap();
        assert!(
            matches!(
                reread.blocks().read(0),
                Err(BlockError::DecodeError { index: 0, .. } | BlockError::IntegrityError { index: 0, .. })
            ),
            "raw size byte {} flipped with {:#x}",
            at,
            flip
        );
        assert_eq!(reread.get("image").unwrap(), doc.get("image").unwrap());
    }
}

#[test]
fn corrupt_offset_is_a_typed_error() {
    // Pointing far past the payloads fails while opening
    let (_, bytes) = with_edited_entry(|entry| entry[7] = 0x7F);
    assert!(matches!(
        Document::from_bytes(bytes),
        Err(DocumentError::Block(BlockError::TruncatedFile(_)))
    ));

    // Shifting by one byte stays in range but no longer matches the CRC
    let (_, bytes) = with_edited_entry(|entry| {
        let offset = u64::from_le_bytes(entry[..8].try_into().unwrap()) - 1;
        entry[..8].copy_from_slice(&offset.to_le_bytes());
    });
    let reread = Document::from_bytes(bytes).unwrap();
    assert!(matches!(
        reread.blocks().read(0),
        Err(BlockError::IntegrityError { index: 0, .. })
    ));
}

#[test]
fn corrupt_compression_id_is_a_typed_error() {
    let (_, bytes) = with_edited_entry(|entry| entry[24..26].copy_from_slice(&99u16.to_le_bytes()));
    let reread = Document::from_bytes(bytes).unwrap();
    assert!(matches!(
        reread.blocks().read(0),
        Err(BlockError::UnknownCodec(_))
    ));

    // Claiming the compressed bytes are stored raw breaks the size check
    let (_, bytes) = with_edited_entry(|entry| entry[24..26].copy_from_slice(&0u16.to_le_bytes()));
    let reread = Document::from_bytes(bytes).unwrap();
    assert!(matches!(
        reread.blocks().read(0),
        Err(BlockError::IntegrityError { index: 0, .. })
    ));
}

#[test]
fn truncated_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    sample_document(DocumentConfig::default())
        .write_to(&path)
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    assert!(matches!(
        Document::open(&path),
        Err(DocumentError::Block(BlockError::TruncatedFile(_)))
    ));
}

#[test]
fn dangling_reference_is_not_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.bdoc");
    let mut doc = Document::new();
    doc.insert_node("broken", Node::Block(blockdoc::BlockRef::new(3)))
        .unwrap();

    assert!(doc.write_to(&path).is_err());
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn raw_blocks_through_hand_built_nodes() {
    let mut doc = Document::new();
    let block = doc
        .blocks_mut()
        .allocate(b"opaque bytes", Some(CompressionId::ZLIB))
        .unwrap();
    doc.insert_node("raw", Node::Block(block)).unwrap();

    let reread = Document::from_bytes(doc.encode(None).unwrap().main).unwrap();
    let block = reread.tree().get("raw").and_then(Node::as_block).unwrap();
    assert_eq!(reread.blocks().read_ref(block).unwrap(), b"opaque bytes");
}
