pub mod access;
pub mod api;
pub mod auth;
pub mod bytesize;
pub mod competition;
pub mod course;
pub mod error;
pub mod event;
pub mod progress;
pub mod purchase;
pub mod quiz;
pub mod team;
pub mod user;
pub mod utils;
