#![forbid(unsafe_code)]

pub mod grading;
pub mod repository;
pub mod sqlite;
