//! The packaged read-only asset container and the writable user area.
//!
//! Game content ships inside one packed archive (inside the APK expansion
//! file on Android). A table of contents at the head of the archive maps
//! asset names to `{offset, length}` ranges; reads go straight to the range,
//! nothing is extracted. The user area is an ordinary writable directory for
//! save data and caches (the preprocessed program-key index lives there).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Archive magic: `EMBP`.
const PACK_MAGIC: u32 = 0x454D_4250;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io error reading asset pack: {0}")]
    Io(#[from] io::Error),

    #[error("not an asset pack (bad magic {0:#010x})")]
    BadMagic(u32),

    #[error("truncated table of contents")]
    TruncatedToc,

    #[error("asset {0:?} not present in pack")]
    NotFound(String),

    #[error("asset {name:?} range {offset}+{length} exceeds pack size {pack_size}")]
    RangeOutOfBounds { name: String, offset: u64, length: u64, pack_size: u64 },
}

/// Byte range of one asset inside the pack file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetLocation {
    pub offset: u64,
    pub length: u64,
}

/// Read-only view over a packed asset container.
#[derive(Debug)]
pub struct AssetPack {
    file: File,
    pack_size: u64,
    toc: HashMap<String, AssetLocation>,
}

impl AssetPack {
    /// Open a pack and parse its table of contents.
    ///
    /// TOC layout, all little-endian: `u32 magic`, `u32 count`, then `count`
    /// records of `{u16 name_len, name bytes (UTF-8), u64 offset, u64 len}`.
    pub fn open(path: &Path) -> Result<Self, PackError> {
        let mut file = File::open(path)?;
        let pack_size = file.metadata()?.len();

        let magic = read_u32(&mut file)?;
        if magic != PACK_MAGIC {
            return Err(PackError::BadMagic(magic));
        }
        let count = read_u32(&mut file)?;

        let mut toc = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = read_u16(&mut file)? as usize;
            let mut name_bytes = vec![0u8; name_len];
            file.read_exact(&mut name_bytes).map_err(|_| PackError::TruncatedToc)?;
            let name = String::from_utf8(name_bytes).map_err(|_| PackError::TruncatedToc)?;
            let offset = read_u64(&mut file)?;
            let length = read_u64(&mut file)?;
            match offset.checked_add(length) {
                Some(end) if end <= pack_size => {}
                _ => return Err(PackError::RangeOutOfBounds { name, offset, length, pack_size }),
            }
            toc.insert(name, AssetLocation { offset, length });
        }

        debug!(entries = toc.len(), pack_size, "asset pack opened");
        Ok(Self { file, pack_size, toc })
    }

    pub fn len(&self) -> usize {
        self.toc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toc.is_empty()
    }

    pub fn pack_size(&self) -> u64 {
        self.pack_size
    }

    /// The byte range for `name`, without reading it.
    pub fn entry(&self, name: &str) -> Option<AssetLocation> {
        self.toc.get(name).copied()
    }

    /// Read the full contents of one asset.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>, PackError> {
        let location = self
            .entry(name)
            .ok_or_else(|| PackError::NotFound(name.to_owned()))?;
        let mut data = vec![0u8; location.length as usize];
        self.file.seek(SeekFrom::Start(location.offset))?;
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Serialize a pack from `(name, contents)` pairs. Used by packaging
    /// tooling and the test suite.
    pub fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let toc_size: usize = 8 + entries
            .iter()
            .map(|(name, _)| 2 + name.len() + 16)
            .sum::<usize>();

        let mut out = Vec::new();
        out.extend_from_slice(&PACK_MAGIC.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        let mut offset = toc_size as u64;
        for (name, data) in entries {
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            offset += data.len() as u64;
        }
        for (_, data) in entries {
            out.extend_from_slice(data);
        }
        out
    }
}

/// Writable per-user storage root.
#[derive(Debug, Clone)]
pub struct UserStorage {
    root: PathBuf,
}

impl UserStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(name))
    }

    /// Write, creating parent directories as needed.
    pub fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }
}

fn read_u16(reader: &mut impl Read) -> Result<u16, PackError> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes).map_err(|_| PackError::TruncatedToc)?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32(reader: &mut impl Read) -> Result<u32, PackError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(|_| PackError::TruncatedToc)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(reader: &mut impl Read) -> Result<u64, PackError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(|_| PackError::TruncatedToc)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_file(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "ember-pack-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn round_trips_entries() {
        let bytes = AssetPack::build(&[
            ("Shaders/Prefix.glsl", b"precision highp float;"),
            ("Maps/Entry.bin", &[0u8, 1, 2, 3]),
        ]);
        let path = temp_file(&bytes);
        let mut pack = AssetPack::open(&path).unwrap();

        assert_eq!(pack.len(), 2);
        assert_eq!(pack.read("Shaders/Prefix.glsl").unwrap(), b"precision highp float;");
        assert_eq!(pack.read("Maps/Entry.bin").unwrap(), &[0, 1, 2, 3]);
        assert!(matches!(pack.read("missing"), Err(PackError::NotFound(_))));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_bad_magic() {
        let path = temp_file(b"ZZZZ\0\0\0\0");
        assert!(matches!(AssetPack::open(&path), Err(PackError::BadMagic(_))));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_out_of_bounds_ranges() {
        let mut bytes = AssetPack::build(&[("a", b"xy")]);
        let len = bytes.len();
        bytes.truncate(len - 1); // drop payload byte so the range overruns
        let path = temp_file(&bytes);
        assert!(matches!(
            AssetPack::open(&path),
            Err(PackError::RangeOutOfBounds { .. })
        ));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn entry_reports_offsets_without_reading() {
        let bytes = AssetPack::build(&[("a", b"12345")]);
        let path = temp_file(&bytes);
        let pack = AssetPack::open(&path).unwrap();
        let location = pack.entry("a").unwrap();
        assert_eq!(location.length, 5);
        assert_eq!(location.offset + location.length, pack.pack_size());
        fs::remove_file(path).unwrap();
    }
}
