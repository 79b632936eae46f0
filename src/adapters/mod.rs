pub mod database;
pub mod identity;
pub mod mail;
pub mod memory;
pub mod storage;
