pub mod deploy;
pub mod env;
pub mod logs;
pub mod package;
pub mod version;
