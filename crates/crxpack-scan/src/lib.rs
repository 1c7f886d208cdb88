//! Static analysis over compiled extension code
//!
//! This crate provides:
//! - the permission detector table and parallel permission inference
//! - a lightweight scanner for import specifiers and export statements
//!
//! Both work on raw compiled text; neither needs a parser.

pub mod imports;
pub mod permissions;

pub use imports::{has_exports, rewrite_specifiers, scan_imports, ImportKind, ImportSpecifier};
pub use permissions::{detect_permissions, infer_permissions, PermissionDetector, DETECTORS};
