pub mod index;
pub mod point;
pub mod store;

pub use index::{HandIndex, PoseIndex};
pub use point::{Landmark, LandmarkSet};
pub use store::{LandmarkSnapshot, LandmarkStore, SlotSnapshot};
