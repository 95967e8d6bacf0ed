pub mod choice;
pub mod content;
pub mod frame;
pub mod game_save;
pub mod snapshot;
pub mod transcript;
