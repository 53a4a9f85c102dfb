//! Hosts file access and line encoding.

pub mod codec;
pub mod file;

pub use codec::{decode, encode, FileLine};
pub use file::HostsFile;
