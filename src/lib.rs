pub mod app;
pub mod command;
pub mod config;
pub mod deps;
pub mod domain;
pub mod error;
pub mod layout;
pub mod materialize;
pub mod output;
pub mod quick;
pub mod reads;
pub mod shebang;
pub mod validate;
