pub mod account;
pub mod callback;
pub mod notification;
