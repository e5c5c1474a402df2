pub mod command;
pub mod environment;
pub mod file_formats;
pub mod settings;
pub mod snapshot;
pub mod species;
