pub mod config_cmd;
pub mod doctor;
pub mod prompt;
pub mod tokens;
