use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One stored point with its payload.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub point: Vec<f64>,
    pub item: T,
}

/// Candidate kept in the bounded result heap, largest distance on top.
#[derive(Debug)]
struct Candidate {
    distance2: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance2
            .total_cmp(&other.distance2)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Immutable k-d tree answering k-nearest and radius queries.
///
/// The tree is implicit: entries are reordered so that the median of each
/// subrange sits at its midpoint, split on the axis of greatest spread.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    /// Maximum number of results; `usize::MAX` means no limit.
    pub k: usize,
    /// Maximum distance of a result; infinite means no limit.
    pub radius: f64,
    entries: Vec<Entry<T>>,
    axes: Vec<usize>,
    dimensions: usize,
}

impl<T: Clone> KdTree<T> {
    pub fn new(k: usize, radius: f64) -> Self {
        Self {
            k,
            radius,
            entries: Vec::new(),
            axes: Vec::new(),
            dimensions: 0,
        }
    }

    /// Replaces the contents with `entries`. O(N log N).
    pub fn set(&mut self, entries: Vec<Entry<T>>) {
        self.dimensions = entries.iter().map(|e| e.point.len()).max().unwrap_or(0);
        self.axes = vec![0; entries.len()];
        self.entries = entries;
        let len = self.entries.len();
        self.build(0, len);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn coordinate(point: &[f64], axis: usize) -> f64 {
        point.get(axis).copied().unwrap_or(0.0)
    }

    fn build(&mut self, start: usize, end: usize) {
        if end - start < 2 {
            return;
        }

        let mut axis = 0;
        let mut spread = f64::NEG_INFINITY;
        for a in 0..self.dimensions {
            let (lo, hi) = self.entries[start..end].iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), e| {
                    let c = Self::coordinate(&e.point, a);
                    (lo.min(c), hi.max(c))
                },
            );
            if hi - lo > spread {
                spread = hi - lo;
                axis = a;
            }
        }

        let middle = start + (end - start) / 2;
        self.entries[start..end].select_nth_unstable_by(middle - start, |a, b| {
            Self::coordinate(&a.point, axis).total_cmp(&Self::coordinate(&b.point, axis))
        });
        self.axes[middle] = axis;
        self.build(start, middle);
        self.build(middle + 1, end);
    }

    /// Entries nearest to `query`, closest first.
    ///
    /// With neither `k` nor `radius` restricting the search every entry is
    /// returned.
    pub fn find(&self, query: &[f64]) -> Vec<T> {
        let limit = self.k.max(1);
        let radius2 = if self.radius.is_finite() {
            self.radius * self.radius
        } else {
            f64::INFINITY
        };
        let mut heap = BinaryHeap::new();
        self.search(0, self.entries.len(), query, limit, radius2, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| self.entries[c.index].item.clone())
            .collect()
    }

    fn search(
        &self,
        start: usize,
        end: usize,
        query: &[f64],
        limit: usize,
        radius2: f64,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        if start >= end {
            return;
        }
        let middle = start + (end - start) / 2;
        let entry = &self.entries[middle];

        let distance2 = (0..self.dimensions.max(query.len()))
            .map(|a| {
                let d = Self::coordinate(&entry.point, a) - Self::coordinate(query, a);
                d * d
            })
            .sum::<f64>();
        if distance2 <= radius2 {
            heap.push(Candidate {
                distance2,
                index: middle,
            });
            if heap.len() > limit {
                heap.pop();
            }
        }

        if end - start == 1 {
            return;
        }
        let axis = self.axes[middle];
        let delta = Self::coordinate(query, axis) - Self::coordinate(&entry.point, axis);
        let (near, far) = if delta < 0.0 {
            ((start, middle), (middle + 1, end))
        } else {
            ((middle + 1, end), (start, middle))
        };
        self.search(near.0, near.1, query, limit, radius2, heap);

        let bound = match heap.peek() {
            Some(worst) if heap.len() >= limit => worst.distance2.min(radius2),
            _ => radius2,
        };
        if delta * delta <= bound {
            self.search(far.0, far.1, query, limit, radius2, heap);
        }
    }
}
