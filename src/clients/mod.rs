pub mod database;
pub mod health;
pub mod memory;
pub mod rbmq;
pub mod redis;
pub mod webhook;
