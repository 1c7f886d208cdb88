pub mod build;
pub mod init;
pub mod permissions;
pub mod validate;
