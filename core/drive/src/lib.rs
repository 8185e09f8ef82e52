//! Remote object store access and path resolution for DriveGate.
//!
//! This crate turns slash-separated client paths into remote object
//! identities. It provides:
//! - The `RemoteStore` seam and the object descriptors it returns
//! - A Google Drive implementation with transparent token refresh
//! - A name+parent keyed resolution cache
//! - The path resolver that walks (and optionally creates) folders
//! - An in-memory store for tests and local development

pub mod cache;
pub mod gdrive;
pub mod memory;
pub mod resolver;
pub mod store;

pub use cache::ResolutionCache;
pub use memory::MemoryStore;
pub use resolver::{PathResolver, Resolution};
pub use store::{
    ByteStream, ObjectMetadata, RemoteResponse, RemoteStore, UploadSession, UploadTarget,
    FOLDER_MIME_TYPE,
};
