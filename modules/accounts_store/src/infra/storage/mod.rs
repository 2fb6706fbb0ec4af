//! Storage layer - persistence collaborators and record mapping

pub mod file;
pub mod mapper;
pub mod memory;

pub use file::FileStorage;
pub use memory::InMemoryStorage;
