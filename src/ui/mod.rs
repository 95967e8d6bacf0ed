pub mod app;
pub mod center_panel;
pub mod menus;
pub mod settings;
pub mod settings_io;
pub mod textures;
