//! Read/write the serialized graph artifact under the repository workspace.

use repograph_core::config::{graph_file, workspace_dir};
use repograph_core::{schema, RpgDocument, RpgError, RpgResult};
use std::fs;
use std::io::Read as _;
use std::path::Path;
use tracing::debug;

/// Zstd magic bytes: 0x28 0xB5 0x2F 0xFD.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Whether a graph artifact exists for the given project root.
pub fn artifact_exists(project_root: &Path) -> bool {
    graph_file(project_root).exists()
}

/// Load the graph artifact. Compressed files are detected by magic bytes.
pub fn load_document(project_root: &Path) -> RpgResult<RpgDocument> {
    let path = graph_file(project_root);
    let raw = fs::read(&path)
        .map_err(|e| RpgError::NotFound(format!("graph artifact {}: {e}", path.display())))?;

    debug!(path = %path.display(), bytes = raw.len(), "loading graph artifact");
    let json = if raw.len() >= 4 && raw[..4] == ZSTD_MAGIC {
        let mut decoder = zstd::Decoder::new(&raw[..])
            .map_err(|e| RpgError::Store(format!("failed to init zstd decoder: {e}")))?;
        let mut decompressed = String::new();
        decoder
            .read_to_string(&mut decompressed)
            .map_err(|e| RpgError::Store(format!("failed to decompress graph artifact: {e}")))?;
        decompressed
    } else {
        String::from_utf8(raw)
            .map_err(|e| RpgError::Store(format!("graph artifact is not valid UTF-8: {e}")))?
    };

    schema::from_json(&json)
}

/// Save the graph artifact, optionally zstd-compressed.
pub fn save_document(project_root: &Path, doc: &RpgDocument, compress: bool) -> RpgResult<()> {
    let dir = workspace_dir(project_root);
    fs::create_dir_all(&dir)
        .map_err(|e| RpgError::Store(format!("failed to create {}: {e}", dir.display())))?;

    let json = schema::to_json(doc)?;
    let path = graph_file(project_root);
    if compress {
        let compressed = zstd::encode_all(json.as_bytes(), 3)
            .map_err(|e| RpgError::Store(format!("zstd compression failed: {e}")))?;
        fs::write(&path, compressed)?;
    } else {
        fs::write(&path, json)?;
    }
    Ok(())
}
