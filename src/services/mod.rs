pub mod assets;
pub mod keys;
pub mod local_storage;
pub mod staging;
pub mod storage;
pub mod transcoder;
pub mod upload;
pub mod url_policy;
