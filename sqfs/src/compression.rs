//! Compression codec dispatch (component F).
//!
//! The extract manager (G) calls a codec exactly once per compressed block,
//! handing it the whole compressed slice and expecting the whole
//! decompressed buffer back, so each codec here is a single `decompress`
//! call rather than an incremental streaming state machine — the teacher's
//! `CompressedBlockReader` in `squinter` wraps a `Read` per block for the
//! same reason, just expressed as a reader instead of a one-shot function.

use num_enum::TryFromPrimitive;

use crate::error::{Error, Result};

/// Compression ids as they appear in the on-disk superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum Compressor {
    None = 0,
    Gzip = 1,
    Lzo = 2,
    Xz = 3,
    Lz4 = 4,
    Zstd = 5,
}

impl Compressor {
    pub fn from_id(id: u16) -> Result<Self> {
        Self::try_from_primitive(id).map_err(|e| Error::UnsupportedCompression(e.number))
    }

    /// Decompress `input` into a buffer that must come out to exactly
    /// `expected_size` bytes. Used for data blocks, where the decompressed
    /// size is implied by the file's block list.
    pub fn decompress(&self, input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        let out = self.decompress_raw(input, expected_size)?;
        if out.len() != expected_size {
            return Err(Error::CorruptedDatablock(0));
        }
        Ok(out)
    }

    /// Decompress `input` into a buffer that must come out to at most
    /// `max_size` bytes, without requiring the exact length to be known in
    /// advance. Used for metablocks, whose decompressed length is bounded
    /// by 8 KiB but not otherwise predictable before decompressing.
    pub fn decompress_bounded(&self, input: &[u8], max_size: usize) -> Result<Vec<u8>> {
        let out = self.decompress_raw(input, max_size)?;
        if out.len() > max_size {
            return Err(Error::CorruptedMetablock(0));
        }
        Ok(out)
    }

    fn decompress_raw(&self, input: &[u8], size_hint: usize) -> Result<Vec<u8>> {
        match self {
            Compressor::None => Ok(input.to_vec()),
            Compressor::Gzip => decompress_gzip(input, size_hint),
            Compressor::Xz => decompress_xz(input, size_hint),
            Compressor::Zstd => decompress_zstd(input, size_hint),
            Compressor::Lz4 => decompress_lz4(input, size_hint),
            Compressor::Lzo => decompress_lzo(input, size_hint),
        }
    }
}

#[cfg(feature = "gzip")]
fn decompress_gzip(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(input);
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| Error::CorruptedDatablock(0))?;
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
fn decompress_gzip(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    Err(Error::UnsupportedCompression(1))
}

#[cfg(feature = "xz")]
fn decompress_xz(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut reader = std::io::BufReader::new(input);
    let mut out = Vec::with_capacity(expected_size);
    lzma_rs::xz_decompress(&mut reader, &mut out).map_err(|_| Error::CorruptedDatablock(0))?;
    Ok(out)
}

#[cfg(not(feature = "xz"))]
fn decompress_xz(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    Err(Error::UnsupportedCompression(3))
}

#[cfg(feature = "zstd")]
fn decompress_zstd(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder =
        ruzstd::StreamingDecoder::new(input).map_err(|_| Error::CorruptedDatablock(0))?;
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| Error::CorruptedDatablock(0))?;
    Ok(out)
}

#[cfg(not(feature = "zstd"))]
fn decompress_zstd(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    Err(Error::UnsupportedCompression(5))
}

#[cfg(feature = "lz4")]
fn decompress_lz4(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    lz4_flex::block::decompress(input, expected_size).map_err(|_| Error::CorruptedDatablock(0))
}

#[cfg(not(feature = "lz4"))]
fn decompress_lz4(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    Err(Error::UnsupportedCompression(4))
}

#[cfg(feature = "lzo")]
fn decompress_lzo(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    // No in-process LZO decoder is wired up yet; mksquashfs images built
    // with `-comp lzo` remain unreadable until one is added.
    Err(Error::UnsupportedCompression(2))
}

#[cfg(not(feature = "lzo"))]
fn decompress_lzo(_input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
    Err(Error::UnsupportedCompression(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_codec_is_identity() {
        let data = vec![1u8, 2, 3, 4];
        let out = Compressor::None.decompress(&data, 4).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn unknown_id_is_unsupported() {
        assert!(matches!(
            Compressor::from_id(99),
            Err(Error::UnsupportedCompression(99))
        ));
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_roundtrip() {
        use std::io::Write;
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello world").unwrap();
        let compressed = encoder.finish().unwrap();
        let out = Compressor::Gzip.decompress(&compressed, 11).unwrap();
        assert_eq!(out, b"hello world");
    }
}
