//! Brotli backend.
//!
//! Stores one option, the compression level, in a 4-byte record after the
//! superblock.  The encoder window is fixed at the codec default and the
//! encoding mode is generic; neither is configurable.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use super::{Compressor, CompressorError, CompressorId, OptionParse};
use crate::pager::write_wrapped;

/// Lowest quality the codec accepts.
pub const COMPRESSION_MIN: i32 = 0;
/// Highest quality the codec accepts.
pub const COMPRESSION_MAX: i32 = 11;
/// Level used when no `-Xcompression-level` is given: maximum quality.
pub const DEFAULT_COMPRESSION: i32 = 11;

// Window fixed at the codec default; not configurable.
const LG_WINDOW: u32 = 22;
// Internal buffer size for the streaming encoder/decoder.
const STREAM_BUF: usize = 4096;

const FLAG_COMPRESSION_LEVEL: &str = "-Xcompression-level";

// ── Stored options record ────────────────────────────────────────────────────

/// Compressor options as stored in the filesystem, immediately after the
/// superblock.  The level field is little-endian on disk on every host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrotliOptions {
    pub compression_level: i32,
}

impl BrotliOptions {
    /// Fixed on-disk size of the record.  The builder uses this to detect
    /// truncated or absent records.
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_i32(&mut buf, self.compression_level);
        buf.to_vec()
    }

    /// Decode a record, undoing the on-disk byte order.
    /// Returns `None` if `buf` is shorter than [`BrotliOptions::SIZE`].
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            compression_level: LittleEndian::read_i32(buf),
        })
    }
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// The brotli backend and its live configuration.
///
/// Option parsing and [`Compressor::extract_options`] mutate the
/// configuration; per-block compression only reads it, so a configured
/// instance can be shared across worker threads.
pub struct BrotliCompressor {
    compression_level: i32,
}

impl BrotliCompressor {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION,
        }
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    /// Worst-case compressed size for `len` input bytes, per the codec.
    /// The builder pre-allocates block destination buffers with this bound.
    pub fn max_compressed_size(len: usize) -> usize {
        brotli::enc::encode::BrotliEncoderMaxCompressedSize(len)
    }

    fn invalid_option(message: String) -> CompressorError {
        CompressorError::InvalidOption {
            compressor: "brotli",
            message,
        }
    }
}

impl Default for BrotliCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for BrotliCompressor {
    fn id(&self) -> CompressorId {
        CompressorId::Brotli
    }

    fn name(&self) -> &'static str {
        "brotli"
    }

    fn parse_option(&mut self, option: &str, args: &[&str])
        -> Result<OptionParse, CompressorError>
    {
        if option != FLAG_COMPRESSION_LEVEL {
            return Ok(OptionParse::Unrecognized);
        }

        let value = args.first().ok_or_else(|| {
            Self::invalid_option(format!(
                "{FLAG_COMPRESSION_LEVEL} missing compression level, \
                 it should be {COMPRESSION_MIN} .. {COMPRESSION_MAX}"
            ))
        })?;

        let level: i32 = value.parse().map_err(|_| {
            Self::invalid_option(format!(
                "{FLAG_COMPRESSION_LEVEL} invalid, \
                 it should be {COMPRESSION_MIN} .. {COMPRESSION_MAX}"
            ))
        })?;
        if !(COMPRESSION_MIN..=COMPRESSION_MAX).contains(&level) {
            return Err(Self::invalid_option(format!(
                "{FLAG_COMPRESSION_LEVEL} invalid, \
                 it should be {COMPRESSION_MIN} .. {COMPRESSION_MAX}"
            )));
        }

        self.compression_level = level;
        Ok(OptionParse::Consumed(1))
    }

    fn option_args(&self, option: &str) -> usize {
        if option == FLAG_COMPRESSION_LEVEL {
            1
        } else {
            0
        }
    }

    fn post_process(&mut self, _block_size: usize) -> Result<(), CompressorError> {
        // No option of this backend depends on the block size.
        Ok(())
    }

    fn dump_options(&self, _block_size: usize) -> Option<Vec<u8>> {
        let opts = BrotliOptions {
            compression_level: self.compression_level,
        };
        Some(opts.to_bytes())
    }

    fn extract_options(&mut self, _block_size: usize, buffer: &[u8])
        -> Result<(), CompressorError>
    {
        if buffer.is_empty() {
            // The filesystem stored no options: reset to defaults so that
            // `-X` flags on the appending command line are overridden.
            self.compression_level = DEFAULT_COMPRESSION;
            return Ok(());
        }

        let opts = BrotliOptions::from_bytes(buffer)
            .ok_or(CompressorError::CorruptOptions { compressor: "brotli" })?;

        if !(COMPRESSION_MIN..=COMPRESSION_MAX).contains(&opts.compression_level) {
            return Err(CompressorError::BadStoredOptions {
                compressor: "brotli",
                message: "bad compression level in stored compressor options".to_string(),
            });
        }

        self.compression_level = opts.compression_level;
        Ok(())
    }

    fn display_options(&self, buffer: &[u8], out: &mut dyn Write)
        -> Result<(), CompressorError>
    {
        let opts = BrotliOptions::from_bytes(buffer)
            .ok_or(CompressorError::CorruptOptions { compressor: "brotli" })?;

        if !(COMPRESSION_MIN..=COMPRESSION_MAX).contains(&opts.compression_level) {
            return Err(CompressorError::BadStoredOptions {
                compressor: "brotli",
                message: "bad compression level in stored compressor options".to_string(),
            });
        }

        writeln!(out, "\tcompression-level {}", opts.compression_level)?;
        Ok(())
    }

    fn init(&self, _block_size: usize, _datablock: bool) -> Result<(), CompressorError> {
        // The one-shot encoder keeps no per-block state.
        Ok(())
    }

    fn compress(&self, src: &[u8], _block_size: usize) -> Result<Vec<u8>, CompressorError> {
        // block_size is not used to bound the output; the destination is
        // sized by the codec's own worst-case query instead.
        let mut out = Vec::with_capacity(Self::max_compressed_size(src.len()));
        {
            // level is range-checked on every boundary crossing, so the cast
            // cannot lose the sign.
            let mut w = brotli::CompressorWriter::new(
                &mut out,
                STREAM_BUF,
                self.compression_level as u32,
                LG_WINDOW,
            );
            w.write_all(src)
                .map_err(|e| CompressorError::Compression(e.to_string()))?;
        }
        Ok(out)
    }

    fn uncompress(&self, src: &[u8], expected_size: usize)
        -> Result<Vec<u8>, CompressorError>
    {
        let mut out = Vec::with_capacity(expected_size);
        brotli::Decompressor::new(src, STREAM_BUF)
            .read_to_end(&mut out)
            .map_err(|e| CompressorError::Decompression(e.to_string()))?;
        if out.len() != expected_size {
            return Err(CompressorError::Decompression(format!(
                "decoded {} bytes, expected {}",
                out.len(),
                expected_size
            )));
        }
        Ok(out)
    }

    fn usage(&self, out: &mut dyn Write, cols: usize) -> io::Result<()> {
        write_wrapped(
            out,
            &format!("\t  {FLAG_COMPRESSION_LEVEL} <compression-level>\n"),
            cols,
        )?;
        write_wrapped(
            out,
            &format!(
                "\t\t<compression-level> should be {COMPRESSION_MIN} .. \
                 {COMPRESSION_MAX} (default {DEFAULT_COMPRESSION})\n"
            ),
            cols,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(comp: &mut BrotliCompressor, args: &[&str]) -> Result<OptionParse, CompressorError> {
        comp.parse_option(args[0], &args[1..])
    }

    #[test]
    fn parse_sets_level() {
        let mut comp = BrotliCompressor::new();
        let outcome = parse(&mut comp, &["-Xcompression-level", "5"]).unwrap();
        assert_eq!(outcome, OptionParse::Consumed(1));
        assert_eq!(comp.compression_level(), 5);
    }

    #[test]
    fn parse_last_wins() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "3"]).unwrap();
        parse(&mut comp, &["-Xcompression-level", "7"]).unwrap();
        assert_eq!(comp.compression_level(), 7);
    }

    #[test]
    fn parse_foreign_flag_unrecognized() {
        let mut comp = BrotliCompressor::new();
        let outcome = parse(&mut comp, &["-Xwindow-size", "15"]).unwrap();
        assert_eq!(outcome, OptionParse::Unrecognized);
        assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);
    }

    #[test]
    fn parse_missing_value_names_bounds() {
        let mut comp = BrotliCompressor::new();
        let err = parse(&mut comp, &["-Xcompression-level"]).unwrap_err();
        assert!(err.to_string().contains("0 .. 11"), "diagnostic was: {err}");
        assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);
    }

    #[test]
    fn parse_non_numeric_rejected() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "4"]).unwrap();
        let err = parse(&mut comp, &["-Xcompression-level", "fast"]).unwrap_err();
        assert!(matches!(err, CompressorError::InvalidOption { .. }));
        // rejected value leaves the previous configuration in place
        assert_eq!(comp.compression_level(), 4);
    }

    #[test]
    fn parse_out_of_range_rejected() {
        let mut comp = BrotliCompressor::new();
        let err = parse(&mut comp, &["-Xcompression-level", "15"]).unwrap_err();
        assert!(err.to_string().contains("0 .. 11"), "diagnostic was: {err}");
        assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);

        let err = parse(&mut comp, &["-Xcompression-level", "-1"]).unwrap_err();
        assert!(matches!(err, CompressorError::InvalidOption { .. }));
    }

    #[test]
    fn option_args_counts() {
        let comp = BrotliCompressor::new();
        assert_eq!(comp.option_args("-Xcompression-level"), 1);
        assert_eq!(comp.option_args("-Xwindow-size"), 0);
    }

    #[test]
    fn dump_record_is_canonical_little_endian() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "5"]).unwrap();
        let record = comp.dump_options(131072).unwrap();
        assert_eq!(record, vec![5, 0, 0, 0]);
    }

    #[test]
    fn record_decodes_independent_of_host_order() {
        // The canonical bytes decode to the same level on any host.
        let opts = BrotliOptions::from_bytes(&[5, 0, 0, 0]).unwrap();
        assert_eq!(opts.compression_level, 5);
        assert_eq!(opts.to_bytes(), vec![5, 0, 0, 0]);
    }

    #[test]
    fn extract_empty_resets_to_default() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "2"]).unwrap();
        comp.extract_options(131072, &[]).unwrap();
        assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);
    }

    #[test]
    fn extract_truncated_fails_without_mutation() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "6"]).unwrap();
        let err = comp.extract_options(131072, &[5, 0]).unwrap_err();
        assert!(matches!(err, CompressorError::CorruptOptions { .. }));
        assert_eq!(comp.compression_level(), 6);
    }

    #[test]
    fn extract_bad_level_fails_without_mutation() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "6"]).unwrap();
        let record = BrotliOptions { compression_level: 99 }.to_bytes();
        let err = comp.extract_options(131072, &record).unwrap_err();
        assert!(matches!(err, CompressorError::BadStoredOptions { .. }));
        assert_eq!(comp.compression_level(), 6);
    }

    #[test]
    fn extract_is_idempotent() {
        let mut comp = BrotliCompressor::new();
        let record = BrotliOptions { compression_level: 9 }.to_bytes();
        comp.extract_options(131072, &record).unwrap();
        assert_eq!(comp.compression_level(), 9);
        comp.extract_options(131072, &record).unwrap();
        assert_eq!(comp.compression_level(), 9);
    }

    #[test]
    fn display_renders_field() {
        let comp = BrotliCompressor::new();
        let record = BrotliOptions { compression_level: 5 }.to_bytes();
        let mut out = Vec::new();
        comp.display_options(&record, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\tcompression-level 5\n");
    }

    #[test]
    fn display_bad_record_produces_no_output() {
        let comp = BrotliCompressor::new();
        let mut out = Vec::new();

        assert!(comp.display_options(&[1], &mut out).is_err());
        assert!(out.is_empty());

        let record = BrotliOptions { compression_level: -3 }.to_bytes();
        assert!(comp.display_options(&record, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn compress_within_bound_and_roundtrips() {
        let mut comp = BrotliCompressor::new();
        parse(&mut comp, &["-Xcompression-level", "5"]).unwrap();
        let data = b"the quick brown fox jumps over the lazy dog ".repeat(512);

        comp.init(131072, true).unwrap();
        let compressed = comp.compress(&data, 131072).unwrap();
        assert!(!compressed.is_empty());
        assert!(compressed.len() <= BrotliCompressor::max_compressed_size(data.len()));
        assert!(compressed.len() < data.len());

        let restored = comp.uncompress(&compressed, data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn uncompress_size_mismatch_fails() {
        let comp = BrotliCompressor::new();
        let compressed = comp.compress(b"some block payload", 131072).unwrap();
        let err = comp.uncompress(&compressed, 4).unwrap_err();
        assert!(matches!(err, CompressorError::Decompression(_)));
    }

    #[test]
    fn uncompress_malformed_input_fails() {
        let comp = BrotliCompressor::new();
        let garbage = [0xde, 0xad, 0xbe, 0xef, 0x42, 0x42, 0x42, 0x42];
        assert!(comp.uncompress(&garbage, 64).is_err());
    }

    #[test]
    fn usage_names_flag_range_and_default() {
        let comp = BrotliCompressor::new();
        let mut out = Vec::new();
        comp.usage(&mut out, 80).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("-Xcompression-level"));
        assert!(text.contains("0 .. 11"));
        assert!(text.contains("(default 11)"));
    }

    proptest! {
        #[test]
        fn roundtrip_law(level in COMPRESSION_MIN..=COMPRESSION_MAX) {
            let mut comp = BrotliCompressor::new();
            let arg = level.to_string();
            let outcome = comp.parse_option("-Xcompression-level", &[arg.as_str()]).unwrap();
            prop_assert_eq!(outcome, OptionParse::Consumed(1));

            let record = comp.dump_options(131072).unwrap();
            prop_assert_eq!(record.len(), BrotliOptions::SIZE);

            let mut fresh = BrotliCompressor::new();
            fresh.extract_options(131072, &record).unwrap();
            prop_assert_eq!(fresh.compression_level(), level);
        }

        #[test]
        fn out_of_range_never_roundtrips(
            level in prop_oneof![i32::MIN..COMPRESSION_MIN, COMPRESSION_MAX + 1..i32::MAX]
        ) {
            let mut comp = BrotliCompressor::new();
            let arg = level.to_string();
            prop_assert!(comp.parse_option("-Xcompression-level", &[arg.as_str()]).is_err());
            prop_assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);

            let record = BrotliOptions { compression_level: level }.to_bytes();
            prop_assert!(comp.extract_options(131072, &record).is_err());
            prop_assert_eq!(comp.compression_level(), DEFAULT_COMPRESSION);
        }
    }
}
