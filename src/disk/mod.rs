pub mod boot_mode;
pub mod btrfs;
pub mod config;
pub mod error;
pub mod format;
pub mod free_space;
pub mod fstab;
pub mod layout;
pub mod mounter;
pub mod naming;
pub mod parsing;
pub mod planner;
pub mod probe;
pub mod session;
pub mod size;
pub mod types;
