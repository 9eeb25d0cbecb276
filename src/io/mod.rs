//! Input/output helpers.
//!
//! - encoding/delimiter sniffing (`sniff`)
//! - record streaming from files and archive entries (`loader`)
//! - JSON exports for the dashboard collaborator (`export`)

pub mod export;
pub mod loader;
pub mod sniff;

pub use export::*;
pub use loader::*;
pub use sniff::*;
