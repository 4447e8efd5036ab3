pub mod info;
pub mod mru;
pub mod read;
pub mod recover;
pub mod save;
pub mod settings;
pub mod write;
