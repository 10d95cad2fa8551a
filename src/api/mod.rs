pub mod error;
pub mod health;
pub mod reschedule;
pub mod subject;
pub mod validation;
