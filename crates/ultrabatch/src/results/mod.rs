//! Reading result records and shaping them for display.

pub mod grouper;
pub mod reader;

pub use grouper::{
    file_count, processing_banner, render_content, strip_code_fences, Batch, BatchFile,
    BatchGrouper, DEFAULT_BATCH_SIZE,
};
pub use reader::{ResultRecord, ResultStoreReader};
