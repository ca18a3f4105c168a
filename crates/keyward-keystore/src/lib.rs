//! keyward-keystore: durable storage for the symmetric key
//!
//! Policy: the first call on a path generates a key and writes it; every
//! later call (in this or any other process) loads the same key.
//!
//! Write discipline:
//!   - creation goes through a temp file in the same directory, fsync, then a
//!     no-clobber link into place, so at most one concurrent writer wins
//!   - a file too short to hold a key is repaired under an exclusive
//!     `<key file>.lock`, again via temp file + fsync + rename
//!   - a file holding a key is never overwritten
//!
//! The resolved key is returned to the caller. Nothing is published through
//! environment variables or other process-global state.

mod atomic;
pub mod error;
pub mod keyfile;
pub mod store;

pub use error::{KeyStoreError, KeyStoreResult};
pub use keyfile::{KeyFileContents, KeyFileFormat};
pub use store::{
    ensure_key, ensure_key_with_timeout, resolve_key, rotate_key, KeyOrigin, KeyState, KeyStore,
    RotationOutcome,
};

/// Version assigned to the first key generated for a deployment
pub const FIRST_KEY_VERSION: u32 = 1;
