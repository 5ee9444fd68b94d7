//! Secret-value handling.
//!
//! Passwords cross the plugin boundary twice: as the admin password inside the
//! connection config, and as the credential password supplied by the host on
//! `new_user`/`update_user`. Both are carried as [`SecretString`].

pub mod types;

pub use types::SecretString;
