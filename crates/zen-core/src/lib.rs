//! Zen Core - Core types shared by the asset pipeline
//!
//! This crate provides the foundational types used throughout Zen:
//! - `AssetRecord`: A catalog row describing one distributed artifact
//! - `AssetContent`: The bytes of an artifact plus integrity information
//! - `VariableSpec`: Declared template variables and their constraints
//! - `VariableValidator`: Required/type/constraint checks with defaults
//! - `Clock`: Injectable wall-clock and monotonic time

pub mod asset;
pub mod checksum;
pub mod clock;
pub mod error;
pub mod fs;
pub mod validation;

pub use asset::{AssetContent, AssetRecord, AssetType, VariableSpec, VariableType};
pub use checksum::{checksum_matches, compute_checksum, normalize_checksum};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{CoreError, Result};
pub use fs::{ensure_dir, write_atomic};
pub use validation::{IssueKind, VariableIssue, VariableValidator, Vars};
