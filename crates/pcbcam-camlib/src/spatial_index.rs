//! Endpoint index for path chaining
//!
//! Toolpath ordering repeatedly asks "which remaining path starts or ends
//! closest to here?". [`PathStorage`] keeps paths in an arena addressed by
//! stable handles and indexes both endpoints of each in an R-tree.

use geo::{Coord, LineString, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// Stable arena index of a stored path
pub type PathHandle = usize;

type IndexedPoint = GeomWithData<[f64; 2], (PathHandle, u64)>;

/// Anything with a start and an end that can be chained
pub trait Endpoints {
    /// Points registered in the index for this item.
    fn endpoints(&self) -> Vec<Coord<f64>>;
}

impl Endpoints for LineString<f64> {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => vec![*first, *last],
            _ => Vec::new(),
        }
    }
}

impl Endpoints for Point<f64> {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        vec![self.0]
    }
}

/// Nearest-neighbour index over point entries owned by handles.
///
/// Equal distances resolve to the entry inserted first.
#[derive(Debug, Default)]
pub struct SpatialPointIndex {
    tree: RTree<IndexedPoint>,
    next_seq: u64,
}

impl SpatialPointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `points` as belonging to `handle`.
    pub fn insert(&mut self, handle: PathHandle, points: &[Coord<f64>]) {
        for p in points {
            let entry = GeomWithData::new([p.x, p.y], (handle, self.next_seq));
            self.next_seq += 1;
            self.tree.insert(entry);
        }
    }

    /// Remove every entry of `handle` located at one of `points`.
    pub fn remove(&mut self, handle: PathHandle, points: &[Coord<f64>]) {
        for p in points {
            let found = self
                .tree
                .locate_all_at_point(&[p.x, p.y])
                .find(|e| e.data.0 == handle)
                .cloned();
            if let Some(entry) = found {
                self.tree.remove(&entry);
            }
        }
    }

    /// Closest indexed point and its owner, or `None` when empty.
    pub fn nearest(&self, query: Coord<f64>) -> Option<(Coord<f64>, PathHandle)> {
        let q = [query.x, query.y];
        let mut iter = self.tree.nearest_neighbor_iter_with_distance_2(&q);
        let (first, best_d2) = iter.next()?;
        let mut best = first;
        for (entry, d2) in iter {
            if d2 > best_d2 {
                break;
            }
            if entry.data.1 < best.data.1 {
                best = entry;
            }
        }
        let [x, y] = *best.geom();
        Some((Coord { x, y }, best.data.0))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Arena of paths with an endpoint index.
///
/// Removing a path leaves a hole in the arena so handles stay valid.
#[derive(Debug)]
pub struct PathStorage<T: Endpoints> {
    objects: Vec<Option<T>>,
    index: SpatialPointIndex,
}

impl<T: Endpoints> Default for PathStorage<T> {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            index: SpatialPointIndex::new(),
        }
    }
}

impl<T: Endpoints> PathStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `obj` and index its endpoints.
    pub fn insert(&mut self, obj: T) -> PathHandle {
        let handle = self.objects.len();
        self.index.insert(handle, &obj.endpoints());
        self.objects.push(Some(obj));
        handle
    }

    /// Take a path out of the arena and the index.
    pub fn remove(&mut self, handle: PathHandle) -> Option<T> {
        let obj = self.objects.get_mut(handle)?.take()?;
        self.index.remove(handle, &obj.endpoints());
        Some(obj)
    }

    pub fn get(&self, handle: PathHandle) -> Option<&T> {
        self.objects.get(handle).and_then(|o| o.as_ref())
    }

    /// Closest endpoint to `query` and the handle owning it.
    pub fn nearest(&self, query: Coord<f64>) -> Option<(Coord<f64>, PathHandle)> {
        self.index.nearest(query)
    }

    /// Remove and return the path closest to `query`, with the matched point.
    pub fn pop_nearest(&mut self, query: Coord<f64>) -> Option<(Coord<f64>, T)> {
        let (pt, handle) = self.nearest(query)?;
        let obj = self.remove(handle)?;
        Some((pt, obj))
    }

    /// Remaining paths in insertion order.
    pub fn objects(&self) -> impl Iterator<Item = &T> {
        self.objects.iter().filter_map(|o| o.as_ref())
    }

    /// Consume the storage, yielding remaining paths in insertion order.
    pub fn into_objects(self) -> Vec<T> {
        self.objects.into_iter().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(points.to_vec())
    }

    #[test]
    fn test_nearest_and_remove() {
        let mut storage = PathStorage::new();
        let a = storage.insert(line(&[(0.0, 0.0), (1.0, 0.0)]));
        let b = storage.insert(line(&[(5.0, 5.0), (6.0, 5.0)]));

        let (pt, h) = storage.nearest(Coord { x: 5.9, y: 5.1 }).unwrap();
        assert_eq!(h, b);
        assert_eq!(pt, Coord { x: 6.0, y: 5.0 });

        storage.remove(b);
        let (_, h) = storage.nearest(Coord { x: 5.9, y: 5.1 }).unwrap();
        assert_eq!(h, a);

        storage.remove(a);
        assert!(storage.nearest(Coord { x: 0.0, y: 0.0 }).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_ties_prefer_first_inserted() {
        let mut index = SpatialPointIndex::new();
        index.insert(7, &[Coord { x: 1.0, y: 0.0 }]);
        index.insert(3, &[Coord { x: -1.0, y: 0.0 }]);
        index.insert(9, &[Coord { x: 0.0, y: 1.0 }]);
        let (_, h) = index.nearest(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert_eq!(h, 7);
    }

    #[test]
    fn test_closed_ring_has_two_entries() {
        let mut storage = PathStorage::new();
        let ring = line(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let h = storage.insert(ring);
        assert_eq!(storage.index.len(), 2);
        storage.remove(h);
        assert_eq!(storage.index.len(), 0);
        assert!(storage.remove(h).is_none());
    }

    #[test]
    fn test_objects_keep_insertion_order() {
        let mut storage = PathStorage::new();
        storage.insert(Point::new(3.0, 0.0));
        let mid = storage.insert(Point::new(1.0, 0.0));
        storage.insert(Point::new(2.0, 0.0));
        storage.remove(mid);
        let xs: Vec<f64> = storage.objects().map(|p| p.x()).collect();
        assert_eq!(xs, vec![3.0, 2.0]);
    }
}
