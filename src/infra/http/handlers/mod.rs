//! Route handlers, one module per resource.

mod comments;
mod health;
mod posts;

pub use comments::*;
pub use health::*;
pub use posts::*;
