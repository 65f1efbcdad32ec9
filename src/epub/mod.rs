mod metadata;
mod toc;
mod transcode;

pub use metadata::MetadataField;
pub use toc::Toc;
pub use transcode::{
    decode_metadata, decode_toc, decode_toc_list, encode_metadata, encode_toc, encode_toc_list,
};
