use proptest::prelude::*;

use crate::auxiliary::template_molecules::gen_water;
use crate::basis::shell::BasisSet;
use crate::submatrix::{
    build_cuts, build_cuts_from_ranges, flatten_cuts, total_extent, unflatten_cuts,
    validate_cuts, SubmatrixCut,
};

#[test]
fn test_submatrix_cuts_water() {
    // Shells: O 1s [0, 1), O 2s [1, 2), O 2p [2, 5), H 1s [5, 6), H 1s [6, 7).
    let basis = BasisSet::from_library(&gen_water(), "sto-3g", false, 1e-10).unwrap();

    let all = build_cuts(&[0, 1, 2, 3, 4], &basis);
    assert_eq!(
        all,
        vec![SubmatrixCut {
            global_offset: 0,
            extent: 7,
            local_offset: 0
        }]
    );

    let gapped = build_cuts(&[0, 2, 4], &basis);
    assert_eq!(
        gapped,
        vec![
            SubmatrixCut {
                global_offset: 0,
                extent: 1,
                local_offset: 0
            },
            SubmatrixCut {
                global_offset: 2,
                extent: 3,
                local_offset: 1
            },
            SubmatrixCut {
                global_offset: 6,
                extent: 1,
                local_offset: 4
            },
        ]
    );
    validate_cuts(&gapped, 5).unwrap();
    assert_eq!(flatten_cuts(&gapped), vec![0, 1, 0, 2, 3, 1, 6, 1, 4]);
    assert_eq!(unflatten_cuts(&flatten_cuts(&gapped)).unwrap(), gapped);
    assert!(unflatten_cuts(&[0, 1]).is_err());

    assert!(build_cuts(&[], &basis).is_empty());
    validate_cuts(&[], 0).unwrap();
}

#[test]
fn test_submatrix_validate_cuts_errors() {
    let cut = |g, e, l| SubmatrixCut {
        global_offset: g,
        extent: e,
        local_offset: l,
    };
    assert!(validate_cuts(&[cut(0, 2, 0), cut(4, 1, 2)], 4).is_err());
    assert!(validate_cuts(&[cut(0, 2, 0), cut(4, 1, 3)], 3).is_err());
    assert!(validate_cuts(&[cut(0, 2, 0), cut(1, 1, 2)], 3).is_err());
    assert!(validate_cuts(&[cut(0, 0, 0)], 0).is_err());
    validate_cuts(&[cut(0, 2, 0), cut(2, 1, 2)], 3).unwrap();

    // Offsets near the top of the index range are rejected instead of wrapping.
    assert_eq!(cut(usize::MAX, 2, 0).checked_global_end(), None);
    assert_eq!(cut(0, 2, usize::MAX - 1).checked_local_end(), None);
    assert!(validate_cuts(&[cut(usize::MAX, 2, 0), cut(3, 1, 2)], 3).is_err());
    assert!(validate_cuts(&[cut(0, usize::MAX, 0), cut(3, 1, usize::MAX)], 0).is_err());
}

/// Strategy for a sorted sequence of disjoint half-open ranges.
fn disjoint_ranges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..4, 1usize..6), 0..40).prop_map(|gaps_and_sizes| {
        let mut start = 0;
        gaps_and_sizes
            .into_iter()
            .map(|(gap, size)| {
                let range = (start + gap, start + gap + size);
                start = range.1;
                range
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_submatrix_cuts_cover_ranges(ranges in disjoint_ranges()) {
        let cuts = build_cuts_from_ranges(ranges.iter().copied());
        let nbe = ranges.iter().map(|(s, e)| e - s).sum::<usize>();
        prop_assert_eq!(total_extent(&cuts), nbe);
        prop_assert!(validate_cuts(&cuts, nbe).is_ok());

        // Adjacent cuts are never mergeable.
        prop_assert!(cuts.windows(2).all(|w| w[0].global_end() < w[1].global_offset));

        // The cuts name exactly the global indices of the ranges, in order.
        let from_ranges = ranges.iter().flat_map(|(s, e)| *s..*e).collect::<Vec<_>>();
        let from_cuts = cuts
            .iter()
            .flat_map(|cut| cut.global_offset..cut.global_end())
            .collect::<Vec<_>>();
        prop_assert_eq!(from_ranges, from_cuts);
    }
}
