pub mod account;
pub mod callback;
pub mod envelope;
pub mod health;
pub mod notification;
pub mod status;
pub mod topology;
