//! On-disk format for the active store and archive buckets.
//!
//! ```text
//! +---------+---------------------------------------------+
//! | "TNWS"  | bincode { format_version: u32, entries: [..] } |
//! +---------+---------------------------------------------+
//! ```
//!
//! The version is decoded first so older layouts can be migrated when the
//! schema changes. Writes go to a sibling `.tmp` file which is then renamed
//! over the target, so a crash never leaves a half-written store behind.

use crate::errors::StoreError;
use crate::models::CacheEntry;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const MAGIC: &[u8; 4] = b"TNWS";
pub const FORMAT_VERSION: u32 = 1;
/// Upper bound on what one decode may allocate. A damaged length prefix
/// then fails as `LimitExceeded` instead of aborting on allocation.
const DECODE_LIMIT: usize = 64 * 1024 * 1024;

fn decode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<DECODE_LIMIT>()
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    entries: &'a [CacheEntry],
}

#[derive(Deserialize)]
struct EnvelopeV1 {
    #[allow(dead_code)]
    format_version: u32,
    entries: Vec<CacheEntry>,
}

pub fn encode(entries: &[CacheEntry]) -> Result<Vec<u8>, StoreError> {
    let envelope = EnvelopeRef {
        format_version: FORMAT_VERSION,
        entries,
    };
    let mut bytes = MAGIC.to_vec();
    bytes.extend(bincode::serde::encode_to_vec(
        &envelope,
        bincode::config::standard(),
    )?);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<CacheEntry>, StoreError> {
    let payload = bytes.strip_prefix(MAGIC).ok_or(StoreError::BadMagic)?;
    let (version, _): (u32, usize) = bincode::serde::decode_from_slice(payload, decode_config())?;

    match version {
        1 => {
            let (envelope, read): (EnvelopeV1, usize) =
                bincode::serde::decode_from_slice(payload, decode_config())?;
            if read != payload.len() {
                return Err(StoreError::TrailingBytes(payload.len() - read));
            }
            Ok(envelope.entries)
        }
        other => Err(StoreError::UnsupportedVersion(other)),
    }
}

/// Read and decode a store file; a missing file is an empty store.
pub async fn load(path: &Path) -> Result<Vec<CacheEntry>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => decode(&bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with the encoded entries via write-then-rename.
pub async fn write_atomic(path: &Path, entries: &[CacheEntry]) -> Result<(), StoreError> {
    let bytes = encode(entries)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = with_suffix(path, "tmp");

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!(path = %path.display(), entries = entries.len(), bytes = bytes.len(), "Wrote cache file");
    Ok(())
}

/// Move an undecodable file aside as `<name>.corrupt` and return the new path.
///
/// An older quarantined file is never overwritten; a timestamp is inserted
/// instead (`<name>.<unix secs>.corrupt`).
pub async fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let mut target = with_suffix(path, "corrupt");
    if fs::try_exists(&target).await? {
        let stamp = chrono::Utc::now().timestamp();
        target = with_suffix(path, &format!("{stamp}.corrupt"));
    }
    fs::rename(path, &target).await?;
    Ok(target)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Valid magic and version, one entry whose first string claims 1 TiB.
#[cfg(test)]
pub(crate) fn oversized_length_bytes() -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(
        bincode::serde::encode_to_vec(FORMAT_VERSION, bincode::config::standard()).unwrap(),
    );
    bytes.push(1); // entry count
    bytes.push(0xFD); // varint marker for a u64 length
    bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            published_date: "2025-05-06T08:00:00Z".into(),
            entity: "Oman".into(),
            topic: "cement".into(),
            title: "Cement".into(),
            url: url.into(),
            source: None,
        }
    }

    #[test]
    fn test_encoded_file_starts_with_magic_and_version() {
        let bytes = encode(&[entry("https://a")]).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        let (version, _): (u32, usize) =
            bincode::serde::decode_from_slice(&bytes[4..], bincode::config::standard()).unwrap();
        assert_eq!(version, FORMAT_VERSION);
        assert_eq!(decode(&bytes).unwrap(), vec![entry("https://a")]);
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        assert!(matches!(decode(b"\x80\x04\x95pickle"), Err(StoreError::BadMagic)));
        assert!(matches!(decode(b""), Err(StoreError::BadMagic)));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend(bincode::serde::encode_to_vec(7u32, bincode::config::standard()).unwrap());
        assert!(matches!(decode(&bytes), Err(StoreError::UnsupportedVersion(7))));
    }

    #[test]
    fn test_decode_rejects_truncated_and_padded() {
        let bytes = encode(&[entry("https://a"), entry("https://b")]).unwrap();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.is_corruption());

        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0, 0]);
        assert!(matches!(decode(&padded), Err(StoreError::TrailingBytes(2))));
    }

    #[test]
    fn test_decode_rejects_oversized_length_without_allocating() {
        let err = decode(&oversized_length_bytes()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Decode(bincode::error::DecodeError::LimitExceeded)
        ));
        assert!(err.is_corruption());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load(&dir.path().join("nope.bin")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/store.bin");
        write_atomic(&path, &[entry("https://a")]).await.unwrap();
        write_atomic(&path, &[entry("https://b")]).await.unwrap();

        assert_eq!(load(&path).await.unwrap(), vec![entry("https://b")]);
        assert!(!with_suffix(&path, "tmp").exists());
    }

    #[tokio::test]
    async fn test_quarantine_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.bin");

        std::fs::write(&path, b"first").unwrap();
        let first = quarantine(&path).await.unwrap();
        assert_eq!(first, dir.path().join("store.bin.corrupt"));

        std::fs::write(&path, b"second").unwrap();
        let second = quarantine(&path).await.unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with(".corrupt"));
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
        assert!(!path.exists());
    }
}
