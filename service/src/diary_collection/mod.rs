pub mod controller;
pub mod state;

pub use controller::{CoverImage, DiaryCollectionController};
pub use state::{DiariesAction, DiariesState};
