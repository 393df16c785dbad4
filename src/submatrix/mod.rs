//! Submatrix cuts mapping a task's compact basis-function indices onto global ones.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;

#[cfg(test)]
#[path = "submatrix_tests.rs"]
mod submatrix_tests;

/// One contiguous block of basis-function indices shared between a compact per-task buffer and a
/// global matrix. Cuts apply symmetrically to rows and columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmatrixCut {
    /// The first global index of the block.
    pub global_offset: usize,

    /// The number of indices in the block.
    pub extent: usize,

    /// The first compact index of the block.
    pub local_offset: usize,
}

impl SubmatrixCut {
    /// One past the last global index of the block.
    pub fn global_end(&self) -> usize {
        self.global_offset + self.extent
    }

    /// One past the last compact index of the block.
    pub fn local_end(&self) -> usize {
        self.local_offset + self.extent
    }

    /// [`Self::global_end`], or `None` if it does not fit in a `usize`.
    pub fn checked_global_end(&self) -> Option<usize> {
        self.global_offset.checked_add(self.extent)
    }

    /// [`Self::local_end`], or `None` if it does not fit in a `usize`.
    pub fn checked_local_end(&self) -> Option<usize> {
        self.local_offset.checked_add(self.extent)
    }
}

impl fmt::Display for SubmatrixCut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) → [{}, {})",
            self.global_offset,
            self.global_end(),
            self.local_offset,
            self.local_end()
        )
    }
}

/// Builds the cuts of a sorted shell list.
///
/// Shells are walked in order; a shell whose global function range starts where the previous
/// one ended extends the current cut, and any other shell starts a new cut. Local offsets are
/// cumulative, so the cuts partition `[0, nbe)` in shell order.
pub fn build_cuts(shell_list: &[usize], basis: &BasisSet) -> Vec<SubmatrixCut> {
    let boundaries = basis.shell_boundaries();
    build_cuts_from_ranges(shell_list.iter().map(|&ishell| boundaries[ishell]))
}

/// Builds cuts from a sequence of half-open global index ranges, merging adjacent ranges.
/// Empty ranges are skipped.
pub fn build_cuts_from_ranges<I>(ranges: I) -> Vec<SubmatrixCut>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut cuts: Vec<SubmatrixCut> = vec![];
    let mut local_offset = 0;
    for (start, end) in ranges.into_iter().filter(|(start, end)| end > start) {
        let extent = end - start;
        match cuts.last_mut() {
            Some(cut) if cut.global_end() == start => cut.extent += extent,
            _ => cuts.push(SubmatrixCut {
                global_offset: start,
                extent,
                local_offset,
            }),
        }
        local_offset += extent;
    }
    cuts
}

/// Flattens cuts into `[global_offset, extent, local_offset]` triples, the layout consumed by
/// batched device kernels.
pub fn flatten_cuts(cuts: &[SubmatrixCut]) -> Vec<usize> {
    cuts.iter()
        .flat_map(|cut| [cut.global_offset, cut.extent, cut.local_offset])
        .collect_vec()
}

/// Recovers cuts from their flattened triples.
pub fn unflatten_cuts(flat: &[usize]) -> Result<Vec<SubmatrixCut>, XcTaskError> {
    if flat.len() % 3 != 0 {
        return Err(XcTaskError::Configuration(format!(
            "flattened cuts of length {} are not triples",
            flat.len()
        )));
    }
    Ok(flat
        .chunks_exact(3)
        .map(|triple| SubmatrixCut {
            global_offset: triple[0],
            extent: triple[1],
            local_offset: triple[2],
        })
        .collect_vec())
}

/// Total extent of a cut sequence.
pub fn total_extent(cuts: &[SubmatrixCut]) -> usize {
    cuts.iter().map(|cut| cut.extent).sum()
}

/// Verifies that cuts tile `[0, nbe)` in order in local-index space and are pairwise
/// non-overlapping and increasing in global-index space.
pub fn validate_cuts(cuts: &[SubmatrixCut], nbe: usize) -> Result<(), XcTaskError> {
    let inconsistency = |reason: String| XcTaskError::ScreeningInconsistency {
        task: None,
        shell: None,
        reason,
    };
    let mut local = 0;
    for (icut, cut) in cuts.iter().enumerate() {
        if cut.extent == 0 {
            return Err(inconsistency(format!("cut {icut} is empty")));
        }
        if cut.local_offset != local {
            return Err(inconsistency(format!(
                "cut {icut} starts at local index {} instead of {local}",
                cut.local_offset
            )));
        }
        local = cut
            .checked_local_end()
            .ok_or_else(|| inconsistency(format!("cut {icut} ends beyond the index range")))?;
    }
    if local != nbe {
        return Err(inconsistency(format!(
            "cut extents sum to {local} instead of nbe = {nbe}"
        )));
    }
    if let Some((icut, _)) = cuts
        .iter()
        .tuple_windows()
        .enumerate()
        .find(|(_, (a, b))| {
            a.checked_global_end()
                .map_or(true, |end| end > b.global_offset)
        })
    {
        return Err(inconsistency(format!(
            "cuts {icut} and {} overlap in global indices",
            icut + 1
        )));
    }
    Ok(())
}
