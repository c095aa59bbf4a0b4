use std::sync::Arc;
use crate::core::Coordinate;

/// Immutable, ordered sequence of coordinates loaded once at startup
///
/// Clones share the same backing storage.
#[derive(Debug, Clone, Default)]
pub struct Track {
    points: Arc<[Coordinate]>,
}

impl Track {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self {
            points: points.into(),
        }
    }

    /// Number of coordinates in the track
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinate at `index`, or `None` past the end of the track
    pub fn get(&self, index: usize) -> Option<&Coordinate> {
        self.points.get(index)
    }
}

impl From<Vec<Coordinate>> for Track {
    fn from(points: Vec<Coordinate>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<Coordinate> for Track {
    fn from_iter<I: IntoIterator<Item = Coordinate>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
