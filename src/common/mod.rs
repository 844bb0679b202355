//! Identifier model, local storage and hop accounting shared by both
//! protocols.

mod hops;
mod id;
mod space;
mod store;

pub use hops::*;
pub use id::*;
pub use space::*;
pub use store::*;
