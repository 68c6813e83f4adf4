pub mod deploy;
pub mod diff;
pub mod status;
