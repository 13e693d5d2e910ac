pub mod api;
pub mod enums;
pub mod error;
pub mod objects;
