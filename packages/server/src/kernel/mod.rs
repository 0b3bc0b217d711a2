//! Kernel module - server infrastructure shared by the domains.

pub mod jobs;
