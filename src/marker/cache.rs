use crate::point::Point;

/// A memoized screen position, stamped with the layout version it was
/// projected against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum ScreenCache {
    Fresh { point: Point, layout_version: u64 },
    #[default]
    Stale,
}

impl ScreenCache {
    /// The cached point, if it was projected against `layout_version`.
    pub(crate) const fn get(self, layout_version: u64) -> Option<Point> {
        match self {
            Self::Fresh {
                point,
                layout_version: stamp,
            } if stamp == layout_version => Some(point),
            _ => None,
        }
    }

    /// The last stored point, whatever layout it belongs to.
    pub(crate) const fn last(self) -> Option<Point> {
        match self {
            Self::Fresh { point, .. } => Some(point),
            Self::Stale => None,
        }
    }

    pub(crate) const fn store(&mut self, point: Point, layout_version: u64) {
        *self = Self::Fresh {
            point,
            layout_version,
        };
    }

    pub(crate) const fn invalidate(&mut self) {
        *self = Self::Stale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_starts_stale() {
        assert_eq!(ScreenCache::default().get(0), None);
        assert_eq!(ScreenCache::default().last(), None);
    }

    #[test]
    fn test_store_then_invalidate() {
        let mut cache = ScreenCache::default();
        cache.store(Point::new(2, 3), 4);
        assert_eq!(cache.get(4), Some(Point::new(2, 3)));
        cache.invalidate();
        assert_eq!(cache, ScreenCache::Stale);
    }

    #[test]
    fn test_other_layout_version_misses_but_keeps_last() {
        let mut cache = ScreenCache::default();
        cache.store(Point::new(1, 1), 4);
        assert_eq!(cache.get(5), None);
        assert_eq!(cache.last(), Some(Point::new(1, 1)));
    }
}
