pub mod chat;
pub mod health;
pub mod tags;
pub mod version;
