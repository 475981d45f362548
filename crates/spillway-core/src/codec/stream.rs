//! Streaming compressor/decompressor wrappers.
//!
//! Segments are written and read one frame at a time, so the codec has to
//! sit in the I/O path as a `Write`/`Read` adapter rather than compress a
//! whole buffer at once.

use std::io::{self, BufRead, Read, Write};

use spillway_common::utils::error::{Error, Result};

use super::SpillCodec;

/// A writer that passes everything through the segment's codec.
pub enum CodecWriter<W: Write> {
    /// No compression.
    Plain(W),
    /// LZ4 frame encoder.
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameEncoder<W>),
    /// Zstandard stream encoder.
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> CodecWriter<W> {
    /// Wraps `inner` with the encoder for `codec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecUnavailable`] if the codec is not in this build.
    pub fn new(inner: W, codec: Option<SpillCodec>) -> Result<Self> {
        match codec {
            None => Ok(Self::Plain(inner)),
            #[cfg(feature = "lz4")]
            Some(SpillCodec::Lz4) => Ok(Self::Lz4(lz4_flex::frame::FrameEncoder::new(inner))),
            #[cfg(feature = "zstd")]
            Some(SpillCodec::Zstd) => Ok(Self::Zstd(zstd::stream::write::Encoder::new(
                inner,
                super::ZSTD_LEVEL,
            )?)),
            #[allow(unreachable_patterns)]
            Some(other) => Err(Error::CodecUnavailable(other.name().to_string())),
        }
    }

    /// Flushes the encoder's trailer and returns the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            #[cfg(feature = "lz4")]
            Self::Lz4(enc) => enc.finish().map_err(io::Error::other),
            #[cfg(feature = "zstd")]
            Self::Zstd(enc) => enc.finish(),
        }
    }
}

impl<W: Write> Write for CodecWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            #[cfg(feature = "lz4")]
            Self::Lz4(enc) => enc.write(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            #[cfg(feature = "lz4")]
            Self::Lz4(enc) => enc.flush(),
            #[cfg(feature = "zstd")]
            Self::Zstd(enc) => enc.flush(),
        }
    }
}

/// A reader that decodes a segment body with its codec.
pub enum CodecReader<R: BufRead> {
    /// No compression.
    Plain(R),
    /// LZ4 frame decoder.
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameDecoder<R>),
    /// Zstandard stream decoder.
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, R>),
}

impl<R: BufRead> CodecReader<R> {
    /// Wraps `inner` with the decoder for `codec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecUnavailable`] if the codec is not in this build.
    pub fn new(inner: R, codec: Option<SpillCodec>) -> Result<Self> {
        match codec {
            None => Ok(Self::Plain(inner)),
            #[cfg(feature = "lz4")]
            Some(SpillCodec::Lz4) => Ok(Self::Lz4(lz4_flex::frame::FrameDecoder::new(inner))),
            #[cfg(feature = "zstd")]
            Some(SpillCodec::Zstd) => Ok(Self::Zstd(zstd::stream::read::Decoder::with_buffer(
                inner,
            )?)),
            #[allow(unreachable_patterns)]
            Some(other) => Err(Error::CodecUnavailable(other.name().to_string())),
        }
    }
}

impl<R: BufRead> Read for CodecReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            #[cfg(feature = "lz4")]
            Self::Lz4(dec) => dec.read(buf).map_err(undecodable),
            #[cfg(feature = "zstd")]
            Self::Zstd(dec) => dec.read(buf).map_err(undecodable),
        }
    }
}

/// Both decoders report malformed input as `ErrorKind::Other`. Recast it as
/// `InvalidData` so a damaged body is told apart from a failing disk.
#[cfg(any(feature = "lz4", feature = "zstd"))]
fn undecodable(e: io::Error) -> io::Error {
    match e.kind() {
        io::ErrorKind::Other => io::Error::new(io::ErrorKind::InvalidData, e),
        _ => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(codec: Option<SpillCodec>) -> (Vec<u8>, usize) {
        let payload: Vec<u8> = b"spill ".iter().copied().cycle().take(64 * 1024).collect();

        let mut writer = CodecWriter::new(Vec::new(), codec).unwrap();
        for chunk in payload.chunks(1000) {
            writer.write_all(chunk).unwrap();
        }
        let encoded = writer.finish().unwrap();
        let encoded_len = encoded.len();

        let mut reader = CodecReader::new(Cursor::new(encoded), codec).unwrap();
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, payload);
        (decoded, encoded_len)
    }

    #[test]
    fn test_plain_passthrough() {
        let (decoded, encoded_len) = round_trip(None);
        assert_eq!(decoded.len(), encoded_len);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_compresses_repetitive_data() {
        let (decoded, encoded_len) = round_trip(Some(SpillCodec::Lz4));
        assert!(encoded_len < decoded.len() / 4);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd_compresses_repetitive_data() {
        let (decoded, encoded_len) = round_trip(Some(SpillCodec::Zstd));
        assert!(encoded_len < decoded.len() / 4);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_garbage_is_invalid_data() {
        let mut reader = CodecReader::new(Cursor::new(vec![0xAB; 64]), Some(SpillCodec::Lz4)).unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd_garbage_is_invalid_data() {
        let mut reader = CodecReader::new(Cursor::new(vec![0xAB; 64]), Some(SpillCodec::Zstd)).unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(not(feature = "zstd"))]
    #[test]
    fn test_compiled_out_codec_rejected() {
        let result = CodecWriter::new(Vec::new(), Some(SpillCodec::Zstd));
        assert!(matches!(result, Err(Error::CodecUnavailable(_))));
    }
}
