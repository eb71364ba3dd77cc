pub mod accounts;
pub mod config;
pub mod envs;
pub mod hierarchy;
pub mod login;
pub mod scope;
