//! Data models for the uploader.
//!
//! `container` and `object` map to the metadata tables of the local object
//! store backend via `sqlx::FromRow`. `remote_object` and `local_file` are the
//! views the transfer and retention services work with.

pub mod container;
pub mod local_file;
pub mod object;
pub mod remote_object;
