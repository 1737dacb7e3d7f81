pub mod closer;
pub mod commands;
pub mod lifecycle;
