//! Save-file framing.
//!
//! A save file wraps one manager snapshot:
//!
//! ```text
//! [u8; 8]  magic "TERATOGN"
//! u64      turn counter
//! [u8; 32] BLAKE3 digest of the snapshot bytes
//! u64      snapshot length
//! ...      snapshot bytes
//! ```
//!
//! Integers are little-endian, as in the snapshot itself.

use std::io::{Read, Write};

use teratogen_entity::codec;

use crate::{Result, SessionError};

/// Leading bytes of every save file.
pub const MAGIC: [u8; 8] = *b"TERATOGN";

/// A decoded save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
    pub turn: u64,
    /// The manager snapshot, ready for `Manager::deserialize`.
    pub snapshot: Vec<u8>,
}

/// BLAKE3 digest of a snapshot.
pub fn digest(snapshot: &[u8]) -> blake3::Hash {
    blake3::hash(snapshot)
}

/// Frame `snapshot` as a save file.
pub fn write_save(out: &mut dyn Write, turn: u64, snapshot: &[u8]) -> Result<()> {
    codec::write_bytes(out, &MAGIC, "save magic")?;
    codec::write_u64(out, turn, "save turn")?;
    codec::write_bytes(out, digest(snapshot).as_bytes(), "save digest")?;
    codec::write_u64(out, snapshot.len() as u64, "save snapshot length")?;
    codec::write_bytes(out, snapshot, "save snapshot")?;
    Ok(())
}

/// Read a save file, optionally checking the snapshot against its digest.
pub fn read_save(input: &mut dyn Read, verify_checksum: bool) -> Result<SaveFile> {
    let magic = codec::read_array::<8>(input, "save magic")?;
    if magic != MAGIC {
        return Err(SessionError::BadMagic { found: magic });
    }
    let turn = codec::read_u64(input, "save turn")?;
    let recorded = blake3::Hash::from(codec::read_array::<32>(input, "save digest")?);
    let len = codec::read_u64(input, "save snapshot length")?;
    let snapshot = codec::read_bytes(input, len, "save snapshot")?;

    if verify_checksum {
        let computed = digest(&snapshot);
        if computed != recorded {
            tracing::error!(%recorded, %computed, "save checksum mismatch");
            return Err(SessionError::ChecksumMismatch {
                recorded: recorded.to_hex().to_string(),
                computed: computed.to_hex().to_string(),
            });
        }
    } else {
        tracing::debug!("save checksum verification skipped");
    }

    Ok(SaveFile { turn, snapshot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use teratogen_entity::EntityError;

    fn framed(turn: u64, snapshot: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_save(&mut out, turn, snapshot).unwrap();
        out
    }

    #[test]
    fn layout() {
        let bytes = framed(7, b"abc");
        assert_eq!(bytes.len(), 8 + 8 + 32 + 8 + 3);
        assert_eq!(&bytes[..8], b"TERATOGN");
        assert_eq!(&bytes[8..16], &7u64.to_le_bytes());
        assert_eq!(&bytes[16..48], blake3::hash(b"abc").as_bytes());
        assert_eq!(&bytes[48..56], &3u64.to_le_bytes());
        assert_eq!(&bytes[56..], b"abc");
    }

    #[test]
    fn read_back() {
        let bytes = framed(42, b"snapshot");
        let save = read_save(&mut bytes.as_slice(), true).unwrap();
        assert_eq!(save.turn, 42);
        assert_eq!(save.snapshot, b"snapshot");
    }

    #[test]
    fn bad_magic() {
        let mut bytes = framed(1, b"x");
        bytes[0] = b'X';
        assert!(matches!(
            read_save(&mut bytes.as_slice(), true),
            Err(SessionError::BadMagic { .. })
        ));
    }

    #[test]
    fn corruption_is_caught_only_when_verifying() {
        let mut bytes = framed(1, b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        assert!(matches!(
            read_save(&mut bytes.as_slice(), true),
            Err(SessionError::ChecksumMismatch { .. })
        ));
        assert!(read_save(&mut bytes.as_slice(), false).is_ok());
    }

    #[test]
    fn truncated_snapshot() {
        let bytes = framed(1, b"payload");
        let err = read_save(&mut &bytes[..bytes.len() - 2], true).unwrap_err();
        assert!(matches!(err, SessionError::Entity(EntityError::Truncated { .. })));
    }
}
