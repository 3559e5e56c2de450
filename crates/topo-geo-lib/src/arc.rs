//! Arc decoding and ring assembly
//!
//! Arcs are stored as delta vectors and shared between neighbouring geometries. An
//! [`ArcTable`] decodes each arc at most once per build and stitches signed arc
//! references into lines and rings.

use crate::topology::{ArcDeltas, Topology, Transform};
use std::sync::{Arc, OnceLock};

/// A 2-D position `[x, y]` in output coordinates
pub type Position = [f64; 2];

/// Decode one delta-encoded arc into absolute positions
///
/// Without a usable transform (absent, or fewer than two components in `scale` or
/// `translate`) the arc decodes to nothing. Deltas with fewer than two components are
/// skipped and leave the running position untouched. Equal consecutive positions are
/// kept as they are.
pub fn decode_arc(arc: &[Vec<f64>], transform: Option<&Transform>) -> Vec<Position> {
    let Some(([sx, sy], [tx, ty])) = transform.and_then(Transform::components) else {
        return Vec::new();
    };

    let mut positions = Vec::with_capacity(arc.len());
    let (mut x, mut y) = (0.0, 0.0);
    for delta in arc {
        let [dx, dy, ..] = delta.as_slice() else {
            continue;
        };
        x += *dx;
        y += *dy;
        positions.push([sx * x + tx, sy * y + ty]);
    }
    positions
}

/// A resolved signed arc reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArcRef {
    /// Index into the arcs table
    pub index: usize,
    /// Whether the decoded arc is traversed backwards
    pub reversed: bool,
}

impl ArcRef {
    /// Resolve a signed reference: `i >= 0` is `arcs[i]`, `i < 0` is `arcs[-i - 1]` reversed
    ///
    /// Returns `None` only when the index cannot be represented on this platform.
    #[inline]
    pub fn from_signed(signed: i64) -> Option<Self> {
        // `!i == -i - 1` and cannot overflow for i64::MIN
        let (raw, reversed) = if signed < 0 {
            (!signed, true)
        } else {
            (signed, false)
        };
        usize::try_from(raw)
            .ok()
            .map(|index| Self { index, reversed })
    }
}

/// Arc lookup for one topology with per-arc decode memoization
///
/// Decoded arcs are cached in a `OnceLock` per slot, so the table can be shared by
/// the worker threads of a parallel build.
pub struct ArcTable<'a> {
    arcs: &'a [ArcDeltas],
    transform: Option<&'a Transform>,
    decoded: Vec<OnceLock<Arc<[Position]>>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> ArcTable<'a> {
    pub fn new(arcs: &'a [ArcDeltas], transform: Option<&'a Transform>) -> Self {
        Self {
            arcs,
            transform,
            decoded: (0..arcs.len()).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn from_topology(topology: &'a Topology) -> Self {
        Self::new(&topology.arcs, topology.transform.as_ref())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Forward decoding of an arc, `None` if the index is out of range
    pub fn decoded(&self, index: usize) -> Option<&[Position]> {
        let arc = self.arcs.get(index)?;
        let slot = self.decoded.get(index)?;
        let positions: &[Position] = slot.get_or_init(|| decode_arc(arc, self.transform).into());
        Some(positions)
    }

    /// Decode a signed reference, reversing it if required
    pub fn resolve(&self, signed: i64) -> Option<Vec<Position>> {
        let arc_ref = ArcRef::from_signed(signed)?;
        let mut positions = self.decoded(arc_ref.index)?.to_vec();
        if arc_ref.reversed {
            positions.reverse();
        }
        Some(positions)
    }

    /// Stitch signed arc references into one line or ring
    ///
    /// Out-of-range references are skipped. Every contributing arc after the first
    /// drops its first position, which is the endpoint shared with the previous arc.
    pub fn assemble(&self, refs: &[i64]) -> Vec<Position> {
        let mut line: Vec<Position> = Vec::with_capacity(refs.len() * 8);
        for &signed in refs {
            let Some(positions) = self.resolve(signed) else {
                continue;
            };
            if line.is_empty() {
                line.extend(positions);
            } else {
                line.extend(positions.into_iter().skip(1));
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Transform {
        Transform::new([1.0, 1.0], [0.0, 0.0])
    }

    fn sample_arcs() -> Vec<ArcDeltas> {
        vec![
            // (0,0) -> (1,0) -> (1,1)
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            // (1,1) -> (0,1) -> (0,0)
            vec![vec![1.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]],
        ]
    }

    #[test]
    fn test_decode_accumulates_deltas() {
        let arc = vec![vec![2.0, 3.0], vec![1.0, 1.0], vec![-1.0, 0.0]];
        let transform = Transform::new([0.5, 2.0], [10.0, 20.0]);
        let positions = decode_arc(&arc, Some(&transform));
        assert_eq!(positions, vec![[11.0, 26.0], [11.5, 28.0], [11.0, 28.0]]);
    }

    #[test]
    fn test_decode_without_transform_is_empty() {
        let arc = vec![vec![2.0, 3.0], vec![1.0, 1.0]];
        assert!(decode_arc(&arc, None).is_empty());

        let short = Transform {
            scale: vec![1.0, 1.0],
            translate: vec![0.0],
        };
        assert!(decode_arc(&arc, Some(&short)).is_empty());
    }

    #[test]
    fn test_decode_skips_short_deltas() {
        let arc = vec![vec![1.0, 1.0], vec![5.0], vec![], vec![1.0, 1.0]];
        let positions = decode_arc(&arc, Some(&identity()));
        assert_eq!(positions, vec![[1.0, 1.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_decode_keeps_repeated_points() {
        let arc = vec![vec![1.0, 1.0], vec![0.0, 0.0], vec![1.0, 0.0]];
        let positions = decode_arc(&arc, Some(&identity()));
        assert_eq!(positions.len(), 3);
        assert_eq!(positions[0], positions[1]);
    }

    #[test]
    fn test_arc_ref_sign_convention() {
        assert_eq!(
            ArcRef::from_signed(0),
            Some(ArcRef {
                index: 0,
                reversed: false
            })
        );
        assert_eq!(
            ArcRef::from_signed(-1),
            Some(ArcRef {
                index: 0,
                reversed: true
            })
        );
        assert_eq!(
            ArcRef::from_signed(-3),
            Some(ArcRef {
                index: 2,
                reversed: true
            })
        );
        let min = ArcRef::from_signed(i64::MIN).unwrap();
        assert!(min.reversed);
        assert_eq!(min.index as u64, i64::MAX as u64);
    }

    #[test]
    fn test_negated_reference_is_exact_reverse() {
        let arcs = sample_arcs();
        let transform = Transform::new([0.25, 0.5], [-89.0, 13.0]);
        let table = ArcTable::new(&arcs, Some(&transform));

        for i in 0..arcs.len() as i64 {
            let forward = table.resolve(i).unwrap();
            let mut backward = table.resolve(-i - 1).unwrap();
            backward.reverse();
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn test_assemble_elides_shared_vertex() {
        let arcs = sample_arcs();
        let transform = identity();
        let table = ArcTable::new(&arcs, Some(&transform));

        let first = table.decoded(0).unwrap().len();
        let second = table.decoded(1).unwrap().len();
        let ring = table.assemble(&[0, 1]);

        assert_eq!(ring.len(), first + second - 1);
        assert_eq!(
            ring,
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]
        );
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_assemble_with_reversed_arc() {
        let arcs = sample_arcs();
        let transform = identity();
        let table = ArcTable::new(&arcs, Some(&transform));

        // Arc 1 reversed runs (0,0) -> (0,1) -> (1,1), then arc 0 reversed back to (0,0)
        let ring = table.assemble(&[-2, -1]);
        assert_eq!(
            ring,
            vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]
        );
    }

    #[test]
    fn test_assemble_skips_out_of_range() {
        let arcs = sample_arcs();
        let transform = identity();
        let table = ArcTable::new(&arcs, Some(&transform));

        let ring = table.assemble(&[7, 0, -9]);
        assert_eq!(ring, table.decoded(0).unwrap().to_vec());
        assert!(table.assemble(&[5, -6]).is_empty());
        assert!(table.assemble(&[]).is_empty());
    }

    #[test]
    fn test_assemble_empty_arcs_contribute_nothing() {
        let arcs = sample_arcs();
        let table = ArcTable::new(&arcs, None);
        assert!(table.assemble(&[0, 1]).is_empty());
    }

    #[test]
    fn test_decoded_is_memoized() {
        let arcs = sample_arcs();
        let transform = identity();
        let table = ArcTable::new(&arcs, Some(&transform));

        let a = table.decoded(0).unwrap().as_ptr();
        let b = table.decoded(0).unwrap().as_ptr();
        assert_eq!(a, b);
        assert!(table.decoded(2).is_none());
    }
}
