pub mod connection;
pub mod log_repository;
pub mod migrations;
pub mod models;
pub mod re_schedule_repository;
pub mod subject_repository;
