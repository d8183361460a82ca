#![allow(dead_code)]

pub mod builders;
pub mod events;
pub mod strategies;

pub use builders::*;
pub use events::*;
pub use strategies::*;
