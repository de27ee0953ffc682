//! Profile input, transparently decompressing gzip and zstd streams.

use crate::Result;
use pprof_graph::Profile;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Compression detected from the leading bytes of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

/// Detect the compression format from magic bytes.
pub fn detect_compression(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else if bytes.starts_with(&ZSTD_MAGIC) {
        Compression::Zstd
    } else {
        Compression::None
    }
}

/// Inflate `bytes` if they are compressed.
pub fn decompress(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let compression = detect_compression(&bytes);
    log::debug!("input compression: {:?} ({} bytes)", compression, bytes.len());

    match compression {
        Compression::None => Ok(bytes),
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        Compression::Zstd => Ok(zstd::decode_all(bytes.as_slice())?),
    }
}

/// Read a profile from any source, compressed or not.
pub fn read_profile<R: Read>(reader: R) -> Result<Profile> {
    let mut bytes = Vec::new();
    BufReader::new(reader).read_to_end(&mut bytes)?;
    let bytes = decompress(bytes)?;
    Ok(Profile::from_slice(&bytes)?)
}

/// Open and read a profile file.
pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<Profile> {
    let file = File::open(path.as_ref())?;
    read_profile(file)
}
