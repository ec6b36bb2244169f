pub mod chat_store;
pub mod file_store;
