//! Compression detection and decompression (gzip, bzip2, xz).
//!
//! Detection looks at the first bytes of a file. Full decompression materializes the whole
//! stream and tolerates truncated or corrupted archives: if the decoder fails after producing
//! some output, that output is returned together with a warning.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use xz2::read::XzDecoder;

use crate::error::{IngestionError, IngestionResult};
use crate::types::CompressionType;

/// gzip: `1f 8b`.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// bzip2: `"BZh"`.
pub const BZIP2_MAGIC: [u8; 3] = *b"BZh";
/// xz: `fd 37 7a 58 5a 00`.
pub const XZ_MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];

/// Output of [`decompress_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data: Vec<u8>,
    /// Set when the stream ended in an error after some data was recovered.
    pub warning: Option<String>,
}

/// Match up to six leading bytes against the known magic numbers.
pub fn detect_compression_from_bytes(header: &[u8]) -> CompressionType {
    if header.starts_with(&GZIP_MAGIC) {
        CompressionType::Gzip
    } else if header.starts_with(&BZIP2_MAGIC) {
        CompressionType::Bzip2
    } else if header.starts_with(&XZ_MAGIC) {
        CompressionType::Xz
    } else {
        CompressionType::None
    }
}

/// Sniff the compression of a file from its magic bytes.
///
/// Any error other than a short read yields [`CompressionType::None`].
pub fn detect_compression_by_magic(path: impl AsRef<Path>) -> CompressionType {
    let path = path.as_ref();
    let mut header = Vec::with_capacity(XZ_MAGIC.len());
    let read = File::open(path).and_then(|f| f.take(XZ_MAGIC.len() as u64).read_to_end(&mut header));
    match read {
        Ok(_) => detect_compression_from_bytes(&header),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "magic byte sniffing failed");
            CompressionType::None
        }
    }
}

/// Decompress an entire file into memory.
///
/// [`CompressionType::None`] simply reads the file.
pub fn decompress_file(path: impl AsRef<Path>, compression: CompressionType) -> IngestionResult<Decompressed> {
    let path = path.as_ref();
    if compression == CompressionType::None {
        return Ok(Decompressed {
            data: std::fs::read(path)?,
            warning: None,
        });
    }
    let file = File::open(path)?;
    let out = decompress_reader(BufReader::new(file), compression)?;
    if let Some(w) = &out.warning {
        tracing::warn!(path = %path.display(), warning = %w, "partial decompression");
    }
    Ok(out)
}

/// Decompress everything readable from `reader`.
pub fn decompress_reader<R: Read>(reader: R, compression: CompressionType) -> IngestionResult<Decompressed> {
    let mut data = Vec::new();
    let result = match compression {
        CompressionType::None => {
            let mut reader = reader;
            reader.read_to_end(&mut data)
        }
        CompressionType::Gzip => MultiGzDecoder::new(reader).read_to_end(&mut data),
        CompressionType::Bzip2 => MultiBzDecoder::new(reader).read_to_end(&mut data),
        CompressionType::Xz => XzDecoder::new(reader).read_to_end(&mut data),
    };

    // `read_to_end` keeps whatever it appended before failing.
    match result {
        Ok(_) => Ok(Decompressed { data, warning: None }),
        Err(err) if !data.is_empty() => Ok(Decompressed {
            data,
            warning: Some(format!(
                "Decompression incomplete: {err}. Some data may be missing."
            )),
        }),
        Err(err) => Err(IngestionError::Decompression {
            message: format!("{compression} stream produced no data: {err}"),
        }),
    }
}

/// Streaming decompression over an open file.
///
/// Dropping the reader releases both the decoder and the file handle.
pub enum DecompressingReader {
    Plain(BufReader<File>),
    Gzip(MultiGzDecoder<BufReader<File>>),
    Bzip2(MultiBzDecoder<BufReader<File>>),
    Xz(XzDecoder<BufReader<File>>),
}

impl DecompressingReader {
    pub fn open(path: impl AsRef<Path>, compression: CompressionType) -> IngestionResult<Self> {
        let inner = BufReader::new(File::open(path)?);
        Ok(match compression {
            CompressionType::None => Self::Plain(inner),
            CompressionType::Gzip => Self::Gzip(MultiGzDecoder::new(inner)),
            CompressionType::Bzip2 => Self::Bzip2(MultiBzDecoder::new(inner)),
            CompressionType::Xz => Self::Xz(XzDecoder::new(inner)),
        })
    }

    pub fn compression(&self) -> CompressionType {
        match self {
            Self::Plain(_) => CompressionType::None,
            Self::Gzip(_) => CompressionType::Gzip,
            Self::Bzip2(_) => CompressionType::Bzip2,
            Self::Xz(_) => CompressionType::Xz,
        }
    }

    /// Tear down the decoder and hand back the underlying file.
    ///
    /// Decoder state is discarded without error.
    pub fn into_file(self) -> File {
        match self {
            Self::Plain(r) => r.into_inner(),
            Self::Gzip(d) => d.into_inner().into_inner(),
            Self::Bzip2(d) => d.into_inner().into_inner(),
            Self::Xz(d) => d.into_inner().into_inner(),
        }
    }
}

impl Read for DecompressingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
            Self::Xz(d) => d.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn magic_detection_checks_each_signature() {
        assert_eq!(detect_compression_from_bytes(&[0x1f, 0x8b, 0x08]), CompressionType::Gzip);
        assert_eq!(detect_compression_from_bytes(b"BZh91AY"), CompressionType::Bzip2);
        assert_eq!(detect_compression_from_bytes(&XZ_MAGIC), CompressionType::Xz);
        assert_eq!(detect_compression_from_bytes(&XZ_MAGIC[..5]), CompressionType::None);
        assert_eq!(detect_compression_from_bytes(&[0x1f]), CompressionType::None);
        assert_eq!(detect_compression_from_bytes(b"a,b,c"), CompressionType::None);
        assert_eq!(detect_compression_from_bytes(&[]), CompressionType::None);
    }

    #[test]
    fn missing_file_sniffs_as_uncompressed() {
        assert_eq!(
            detect_compression_by_magic("/definitely/not/here.bin"),
            CompressionType::None
        );
    }

    #[test]
    fn gzip_round_trip_in_memory() {
        let raw = b"a,b\n1,2\n".repeat(100);
        let out = decompress_reader(gzip(&raw).as_slice(), CompressionType::Gzip).unwrap();
        assert_eq!(out.data, raw);
        assert!(out.warning.is_none());
    }

    #[test]
    fn garbage_after_magic_is_a_hard_failure() {
        let bogus = [0x1f, 0x8b, 0xff, 0xff, 0x00, 0x01, 0x02];
        let err = decompress_reader(&bogus[..], CompressionType::Gzip).unwrap_err();
        assert!(matches!(err, IngestionError::Decompression { .. }));
    }
}
