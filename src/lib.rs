pub mod cleanup;
pub mod codec;
pub mod container;
pub mod crypto;
pub mod filter;
pub mod metadata;
pub mod pipeline;
pub mod record;
pub mod schedule;
pub mod traverse;

pub use codec::{get_codec, CodecId};
pub use container::ContainerFormat;
pub use crypto::CipherId;
pub use pipeline::{backup, restore, BackupOptions, EngineError, RestoreOptions};
pub use record::{FileKind, FileRecord};
