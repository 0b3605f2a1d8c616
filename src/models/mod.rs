pub mod chat;
pub mod trends;
