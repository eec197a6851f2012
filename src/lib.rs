pub mod compressor;
pub mod pager;

pub use compressor::{
    get_compressor, get_compressor_by_id, get_compressor_by_name, BrotliCompressor, Compressor,
    CompressorError, CompressorId, OptionParse,
};
