pub mod config;
pub mod db;
pub mod domain;
pub mod middleware;
pub mod password;
pub mod state;
pub mod storage;
pub mod web;
