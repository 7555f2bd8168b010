// Application layer: the wrangler's jobs and the launcher the binaries share.

pub mod launcher;
pub mod scripts;
