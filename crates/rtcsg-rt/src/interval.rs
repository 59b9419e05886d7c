//! Interval algebra over ray distances.
//!
//! An [`IntervalSet`] is a sorted list of disjoint spans. Every span end is
//! a real primitive hit, so the boolean operators never invent distances:
//! a cut made by the other operand reuses that operand's boundary.

use rtcsg_prim::{Hit, Segment};

use crate::SolidKey;

/// One end of a span: the hit, the solid it came from, and whether the
/// solid's outward normal must be reversed there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    /// The primitive hit.
    pub hit: Hit,
    /// Solid that produced the hit.
    pub solid: SolidKey,
    /// Reverse the reported normal.
    pub flip: bool,
}

impl Boundary {
    /// Unflipped boundary.
    pub fn new(hit: Hit, solid: SolidKey) -> Self {
        Self {
            hit,
            solid,
            flip: false,
        }
    }

    /// Same boundary with the normal reversed.
    pub fn flipped(self) -> Self {
        Self {
            flip: !self.flip,
            ..self
        }
    }

    /// Distance along the ray.
    #[inline]
    pub fn dist(&self) -> f64 {
        self.hit.dist
    }
}

/// `[entry, exit]` along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    /// Start.
    pub entry: Boundary,
    /// End.
    pub exit: Boundary,
}

impl Span {
    /// Span covering one segment of `solid`.
    pub fn from_segment(solid: SolidKey, segment: &Segment) -> Self {
        Self {
            entry: Boundary::new(segment.entry, solid),
            exit: Boundary::new(segment.exit, solid),
        }
    }

    /// Entry distance.
    #[inline]
    pub fn start(&self) -> f64 {
        self.entry.dist()
    }

    /// Exit distance.
    #[inline]
    pub fn end(&self) -> f64 {
        self.exit.dist()
    }

    /// `end - start`.
    pub fn depth(&self) -> f64 {
        self.end() - self.start()
    }
}

/// Sorted, disjoint spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    spans: Vec<Span>,
}

impl IntervalSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize arbitrary spans: sort, then merge spans closer than `tol`.
    pub fn from_spans(mut spans: Vec<Span>, tol: f64) -> Self {
        spans.sort_by(|a, b| {
            a.start()
                .total_cmp(&b.start())
                .then(a.end().total_cmp(&b.end()))
        });
        let mut set = Self::new();
        for span in spans {
            set.push(span, tol);
        }
        set
    }

    /// Append a span that starts no earlier than the last one, merging it
    /// into the last span when they touch within `tol`.
    pub fn push(&mut self, span: Span, tol: f64) {
        match self.spans.last_mut() {
            Some(last) if span.start() <= last.end() + tol => {
                if span.end() > last.end() {
                    last.exit = span.exit;
                }
            }
            _ => self.spans.push(span),
        }
    }

    /// The spans, in increasing distance.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number of spans.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// `(start, end)` of every span.
    pub fn extents(&self) -> Vec<(f64, f64)> {
        self.spans.iter().map(|s| (s.start(), s.end())).collect()
    }

    /// Strictly increasing, non-overlapping and every span non-empty.
    pub fn is_well_formed(&self) -> bool {
        self.spans.iter().all(|s| s.start() < s.end())
            && self.spans.windows(2).all(|w| w[0].end() < w[1].start())
    }

    /// Material in either set.
    pub fn union(&self, other: &IntervalSet, tol: f64) -> IntervalSet {
        let mut all = Vec::with_capacity(self.len() + other.len());
        all.extend_from_slice(&self.spans);
        all.extend_from_slice(&other.spans);
        Self::from_spans(all, tol)
    }

    /// Material in both sets. Slivers no longer than `tol` are dropped.
    pub fn intersect(&self, other: &IntervalSet, tol: f64) -> IntervalSet {
        let mut out = Self::new();
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let a = &self.spans[i];
            let b = &other.spans[j];
            let entry = if a.start() >= b.start() { a.entry } else { b.entry };
            let exit = if a.end() <= b.end() { a.exit } else { b.exit };
            if exit.dist() - entry.dist() > tol {
                out.spans.push(Span { entry, exit });
            }
            if a.end() < b.end() {
                i += 1;
            } else {
                j += 1;
            }
        }
        out
    }

    /// Material in `self` but not in `other`. Where `other` cuts a span the
    /// new boundary is `other`'s, with its normal reversed.
    pub fn subtract(&self, other: &IntervalSet, tol: f64) -> IntervalSet {
        let mut out = Self::new();
        let mut first = 0;
        for a in &self.spans {
            while first < other.spans.len() && other.spans[first].end() <= a.start() {
                first += 1;
            }
            let mut from = a.entry;
            let mut consumed = false;
            for b in other.spans[first..]
                .iter()
                .take_while(|b| b.start() < a.end())
            {
                if b.start() > from.dist() {
                    out.push_piece(from, b.entry.flipped(), tol);
                }
                if b.end() > from.dist() {
                    from = b.exit.flipped();
                }
                if from.dist() >= a.end() {
                    consumed = true;
                    break;
                }
            }
            if !consumed {
                out.push_piece(from, a.exit, tol);
            }
        }
        out
    }

    fn push_piece(&mut self, entry: Boundary, exit: Boundary, tol: f64) {
        if exit.dist() - entry.dist() > tol {
            self.spans.push(Span { entry, exit });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use slotmap::SlotMap;

    const TOL: f64 = 0.0005;

    fn keys() -> (SolidKey, SolidKey) {
        let mut map: SlotMap<SolidKey, ()> = SlotMap::with_key();
        (map.insert(()), map.insert(()))
    }

    fn set(key: SolidKey, extents: &[(f64, f64)]) -> IntervalSet {
        let spans = extents
            .iter()
            .map(|&(s, e)| Span::from_segment(key, &Segment::new(Hit::new(s, 0), Hit::new(e, 1))))
            .collect();
        IntervalSet::from_spans(spans, TOL)
    }

    fn random_set(rng: &mut StdRng, key: SolidKey) -> IntervalSet {
        let n = rng.gen_range(0..6);
        let extents: Vec<(f64, f64)> = (0..n)
            .map(|_| {
                let s = rng.gen_range(-10.0..10.0);
                (s, s + rng.gen_range(0.01..4.0))
            })
            .collect();
        set(key, &extents)
    }

    fn overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
        a.1.min(b.1) - a.0.max(b.0)
    }

    #[test]
    fn test_normalize_merges() {
        let (k, _) = keys();
        let s = set(k, &[(3.0, 4.0), (0.0, 1.0), (0.5, 2.0), (2.0002, 2.5)]);
        assert_eq!(s.extents(), vec![(0.0, 2.5), (3.0, 4.0)]);
        assert!(s.is_well_formed());
    }

    #[test]
    fn test_operators() {
        let (ka, kb) = keys();
        let a = set(ka, &[(0.0, 4.0)]);
        let b = set(kb, &[(1.0, 2.0), (3.0, 5.0)]);
        assert_eq!(a.union(&b, TOL).extents(), vec![(0.0, 5.0)]);
        assert_eq!(a.intersect(&b, TOL).extents(), vec![(1.0, 2.0), (3.0, 4.0)]);

        let diff = a.subtract(&b, TOL);
        assert_eq!(diff.extents(), vec![(0.0, 1.0), (2.0, 3.0)]);
        // cut boundaries come from the subtrahend, reversed
        let cut = diff.spans()[0].exit;
        assert_eq!(cut.solid, kb);
        assert!(cut.flip);
        assert!(!diff.spans()[0].entry.flip);
    }

    #[test]
    fn test_subtract_covering_span() {
        let (ka, kb) = keys();
        let a = set(ka, &[(1.0, 2.0), (3.0, 4.0)]);
        let b = set(kb, &[(0.0, 5.0)]);
        assert!(a.subtract(&b, TOL).is_empty());
        assert_eq!(b.subtract(&a, TOL).extents(), vec![(0.0, 1.0), (2.0, 3.0), (4.0, 5.0)]);
    }

    #[test]
    fn test_boolean_laws() {
        let (ka, kb) = keys();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let a = random_set(&mut rng, ka);
            let b = random_set(&mut rng, kb);

            let ab = a.union(&b, TOL);
            assert_eq!(ab.extents(), b.union(&a, TOL).extents());
            assert!(ab.is_well_formed());

            let both = a.intersect(&b, TOL);
            assert!(both.is_well_formed());
            for piece in both.extents() {
                for src in [&a, &b] {
                    assert!(src
                        .extents()
                        .iter()
                        .any(|s| s.0 <= piece.0 && piece.1 <= s.1));
                }
            }

            let diff = a.subtract(&b, TOL);
            assert!(diff.is_well_formed());
            for piece in diff.extents() {
                for cut in b.extents() {
                    assert!(overlap(piece, cut) <= 0.0);
                }
            }
        }
    }
}
