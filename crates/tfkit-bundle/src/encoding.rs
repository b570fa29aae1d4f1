//! Binary-to-text transcoding of bundles.
//!
//! Bundles are stored as standard base64 in a single string property.
//! Decoding ignores whitespace so line-wrapped text written by older
//! releases still decodes.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use tfkit_core::Error;

/// Encode bytes as bundle text.
pub fn encode_bytes(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode bundle text, tolerating embedded line breaks.
pub fn decode_text(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .context("Failed to decode bundle text")
}

/// Read a file and encode its content as bundle text.
pub fn encode_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path).map_err(|e| Error::from_io(path, e))?;
    Ok(encode_bytes(&data))
}

/// Decode bundle text into a new temporary `.zip` file inside `dir`.
///
/// The returned path is deleted when dropped.
pub fn decode_to_file(text: &str, dir: &Path) -> Result<TempPath> {
    let data = decode_text(text)?;
    std::fs::create_dir_all(dir).map_err(|e| Error::from_io(dir, e))?;

    let mut file = tempfile::Builder::new()
        .prefix("tfkit-source-")
        .suffix(".zip")
        .tempfile_in(dir)
        .map_err(|e| Error::from_io(dir, e))?;
    file.write_all(&data)
        .with_context(|| format!("Failed to write decoded bundle to {}", dir.display()))?;
    file.flush()?;

    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_binary_content_survives() {
        let dir = TempDir::new().unwrap();
        let original: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let source = dir.path().join("blob.bin");
        std::fs::write(&source, &original).unwrap();

        let text = encode_file(&source).unwrap();
        let decoded = decode_to_file(&text, dir.path()).unwrap();
        assert_eq!(std::fs::read(&decoded).unwrap(), original);
    }

    #[test]
    fn test_empty_content() {
        let dir = TempDir::new().unwrap();
        let decoded = decode_to_file(&encode_bytes(&[]), dir.path()).unwrap();
        assert!(std::fs::read(&decoded).unwrap().is_empty());
    }

    #[test]
    fn test_line_wrapped_text_decodes() {
        let data = b"legacy bundles were wrapped every 76 characters by the encoder".repeat(4);
        let encoded = encode_bytes(&data);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(decode_text(&wrapped).unwrap(), data);
    }

    #[test]
    fn test_invalid_text_is_an_error() {
        assert!(decode_text("not base64 !!").is_err());
    }

    #[test]
    fn test_decoded_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let decoded = decode_to_file(&encode_bytes(b"zip"), dir.path()).unwrap();
        let path = decoded.to_path_buf();
        assert!(path.exists());
        drop(decoded);
        assert!(!path.exists());
    }
}
