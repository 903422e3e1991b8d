pub mod api;
pub mod clock;
pub mod config;
pub mod cors;
pub mod orm;
pub mod paste_repo;
pub mod paste_service;
pub mod views;
