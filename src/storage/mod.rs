pub mod blobio;
pub mod link_list;
pub mod page;
pub mod record;

pub use blobio::{
    atomic_rename, data_level0_path, header_path, header_tmp_path, link_lists_path,
    original_vectors_path, BlobIo, FsBlobIo,
};
pub use link_list::{LinkEntry, LinkListTable};
pub use page::{DirtyBitmap, DEFAULT_PAGE_SIZE};
pub use record::{RecordLayout, RecordTable};
