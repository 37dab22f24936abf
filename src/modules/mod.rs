pub mod action;
pub mod config;
pub mod entity;
pub mod error;
pub mod grid;
pub mod mind;
pub mod resolve;
pub mod state;
pub mod stats;
pub mod view;
pub mod vm;
pub mod world;
