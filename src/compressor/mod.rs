//! Compressor registry: the closed set of backends the arcfs builder can use.
//!
//! # Identity rules
//! Every backend is identified by a stable numeric id and a name string.
//! The id is written into the superblock's `compression` field on disk; the
//! name is what `-comp <name>` selects on the command line.  Ids are
//! permanent and never reused.  A reader that encounters an id this build
//! does not supply MUST fail immediately — there is no fallback backend.
//!
//! # Host lifecycle
//! The builder drives every backend through the same fixed sequence:
//!
//! 1. option parsing — zero or more [`Compressor::parse_option`] calls,
//!    one per `-X` token the tokenizer hands over;
//! 2. [`Compressor::post_process`] — exactly once, after all options;
//! 3. [`Compressor::dump_options`] when building a new filesystem, or
//!    [`Compressor::extract_options`] when appending to an existing one;
//! 4. repeated [`Compressor::init`] + [`Compressor::compress`] /
//!    [`Compressor::uncompress`] calls, one pair per block.
//!
//! Steps 1–3 configure the backend through `&mut self`.  Step 4 takes
//! `&self` only, so a configured backend can be shared read-only across the
//! builder's worker threads.  The backend itself does no locking.

use std::io::{self, Write};
use thiserror::Error;

pub mod brotli;

pub use self::brotli::BrotliCompressor;

// ── Stable on-disk ids ───────────────────────────────────────────────────────
//
// These values are permanent.  Ids 1..=6 are reserved by earlier backends of
// the on-disk format and MUST NOT be reassigned, even in builds that do not
// supply them.

/// On-disk id of the brotli backend.
pub const BROTLI_COMPRESSION: u16 = 7;

// ── CompressorId ─────────────────────────────────────────────────────────────

/// Compressor discriminant: the closed set of backends this build supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorId {
    Brotli,
}

impl CompressorId {
    /// Returns the stable numeric id written to the superblock.
    #[inline]
    pub fn id(self) -> u16 {
        match self {
            CompressorId::Brotli => BROTLI_COMPRESSION,
        }
    }

    /// Human-readable backend name (also the `-comp` selector).
    pub fn name(self) -> &'static str {
        match self {
            CompressorId::Brotli => "brotli",
        }
    }

    /// Resolve a superblock id to a backend.
    /// Returns `None` if the id is not supplied by this build.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            BROTLI_COMPRESSION => Some(CompressorId::Brotli),
            _ => None,
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "brotli" => Some(CompressorId::Brotli),
            _ => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CompressorError {
    /// A recognised option with a missing or unusable value.  Fatal to
    /// option parsing — distinct from [`OptionParse::Unrecognized`], which
    /// tells the host to try the remaining backends.
    #[error("{compressor}: {message}")]
    InvalidOption {
        compressor: &'static str,
        message: String,
    },
    /// Stored options record shorter than the backend's fixed record size.
    #[error("{compressor}: stored compressor options are truncated or corrupt")]
    CorruptOptions { compressor: &'static str },
    /// Stored options record decoded, but a field failed validation.
    #[error("{compressor}: {message}")]
    BadStoredOptions {
        compressor: &'static str,
        message: String,
    },
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// Emitted when a superblock id or CLI name resolves to no backend in
    /// this build.  The host MUST NOT substitute another backend.
    #[error("Unknown compressor: {0}")]
    UnknownCompressor(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Option parsing outcome ───────────────────────────────────────────────────

/// Successful outcome of handing one `-X` token to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionParse {
    /// The backend owns the flag and consumed `n` tokens beyond it.
    Consumed(usize),
    /// The flag belongs to no option of this backend; the host should offer
    /// it to the remaining backends before rejecting it.
    Unrecognized,
}

// ── Compressor trait ─────────────────────────────────────────────────────────

pub trait Compressor: Send + Sync {
    fn id(&self) -> CompressorId;
    fn name(&self) -> &'static str;

    /// Parse one compressor option.
    ///
    /// `option` is the flag token itself; `args` is the remaining argument
    /// list, from which a flag taking a value consumes its leading entries.
    ///
    /// Returns [`OptionParse::Consumed`] with the number of extra tokens
    /// taken on success, [`OptionParse::Unrecognized`] if the flag is not
    /// owned by this backend, or an [`CompressorError::InvalidOption`] error
    /// if the flag is recognised but its value is missing or bad.
    ///
    /// A successful parse commits into the backend's configuration
    /// immediately; the last successful parse of a flag wins.
    fn parse_option(&mut self, option: &str, args: &[&str])
        -> Result<OptionParse, CompressorError>;

    /// How many extra arguments `option` consumes beyond the flag itself.
    /// Used by the host to step over compressor options without re-parsing.
    fn option_args(&self, option: &str) -> usize;

    /// Called once after all options have been parsed, with values (the
    /// filesystem block size) that are not known at parse time.
    fn post_process(&mut self, block_size: usize) -> Result<(), CompressorError>;

    /// Dump the parsed options in the form stored in the filesystem,
    /// immediately after the superblock.
    ///
    /// Returns the record as an owned buffer, or `None` if the backend has
    /// no options to store.  The record is fixed-size and every multi-byte
    /// field is little-endian regardless of host byte order.
    fn dump_options(&self, block_size: usize) -> Option<Vec<u8>>;

    /// Restore configuration from a stored options record, for append mode.
    ///
    /// Append mode must reproduce the configuration the filesystem was
    /// built with, so this is called even when the filesystem stored no
    /// record (`buffer` empty) — in that case the backend resets to its
    /// defaults, overriding any `-X` flags from the appending command line.
    ///
    /// A truncated or invalid record is an error and leaves the current
    /// configuration untouched.
    fn extract_options(&mut self, block_size: usize, buffer: &[u8])
        -> Result<(), CompressorError>;

    /// Render a stored options record human-readably, one field per line.
    /// Read-only: applies the same normalization and validation as
    /// [`Compressor::extract_options`] without touching configuration.
    /// On validation failure no field output is produced.
    fn display_options(&self, buffer: &[u8], out: &mut dyn Write)
        -> Result<(), CompressorError>;

    /// Per-block initialisation hook, called before each
    /// [`Compressor::compress`] / [`Compressor::uncompress`].
    fn init(&self, block_size: usize, datablock: bool) -> Result<(), CompressorError>;

    /// Compress one block at the configured level, returning the compressed
    /// bytes.  Output never exceeds the backend's declared worst-case bound
    /// for `src.len()`.
    fn compress(&self, src: &[u8], block_size: usize) -> Result<Vec<u8>, CompressorError>;

    /// Decompress one block.  `expected_size` is the original block size
    /// recorded by the builder; a decode that produces any other length is
    /// an error, as is malformed input.
    fn uncompress(&self, src: &[u8], expected_size: usize)
        -> Result<Vec<u8>, CompressorError>;

    /// Write this backend's option usage text, word-wrapped to `cols`.
    fn usage(&self, out: &mut dyn Write, cols: usize) -> io::Result<()>;
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Construct a backend with default configuration.
pub fn get_compressor(id: CompressorId) -> Box<dyn Compressor> {
    match id {
        CompressorId::Brotli => Box::new(BrotliCompressor::new()),
    }
}

/// Resolve a superblock compression id to a backend.
///
/// Returns `Err(CompressorError::UnknownCompressor)` if the id is not
/// supplied by this build.  The caller MUST NOT fall back to any other
/// backend — fail hard.
pub fn get_compressor_by_id(id: u16) -> Result<Box<dyn Compressor>, CompressorError> {
    match CompressorId::from_id(id) {
        Some(c) => Ok(get_compressor(c)),
        None => Err(CompressorError::UnknownCompressor(format!("id {id}"))),
    }
}

/// Resolve a CLI backend name to a backend.
pub fn get_compressor_by_name(name: &str) -> Result<Box<dyn Compressor>, CompressorError> {
    match CompressorId::from_name(name) {
        Some(c) => Ok(get_compressor(c)),
        None => Err(CompressorError::UnknownCompressor(name.to_string())),
    }
}
