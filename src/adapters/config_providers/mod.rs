pub mod file;

pub use file::FileConfigProvider;
