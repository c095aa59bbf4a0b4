pub mod coordinate;
pub mod track;

pub use coordinate::Coordinate;
pub use track::Track;
