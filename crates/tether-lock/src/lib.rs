pub use commit::{acquire, commit, read};
pub use content_hash::content_hash;
pub use diff::{LockChange, diff};
pub use error::{LockError, LockErrorKind};
pub use lock::{Lock, LockMetadata, LockedPackage, StaleLock};
pub use tree::TreeDisplay;
pub use verify::{
    HashMismatch, VerifyError, hash_file, verify_artifacts, verify_lock, verify_package,
};

mod commit;
mod content_hash;
mod diff;
mod error;
mod lock;
mod tree;
mod verify;
