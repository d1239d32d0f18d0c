pub mod backend;
pub mod conversation;
