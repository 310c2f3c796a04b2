pub mod place;
pub mod replay;

pub use place::{place, PlaceArgs};
pub use replay::{replay, ReplayArgs};
