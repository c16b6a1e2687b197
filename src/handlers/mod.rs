pub mod commands;
pub mod offer;
pub mod shell;
