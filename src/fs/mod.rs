//! Virtual File System
//!
//! The interpreter never touches the host filesystem: everything goes
//! through the async [`FileSystem`] trait, with [`InMemoryFs`] as the
//! default backend and [`SyncFsAdapter`] bridging into the synchronous
//! execution engine.

pub mod memfs;
pub mod sync;
pub mod types;

pub use memfs::InMemoryFs;
pub use sync::{SyncFs, SyncFsAdapter};
pub use types::{
    CopyOptions, DirEntry, FileContent, FileInit, FileSystem, FsError, FsStat, InitialFiles,
    MkdirOptions, RemoveOptions,
};
