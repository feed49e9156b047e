//! Application services layer.

pub mod comments;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod requester;
