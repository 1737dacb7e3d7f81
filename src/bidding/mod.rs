pub mod commands;
pub mod participation;
pub mod validator;
