//! Gathering of compact per-task blocks out of global basis-function matrices, and
//! scatter-accumulation of compact contributions back into them.
//!
//! A global matrix is treated as an arena: a task refers into it only through the offsets of its
//! [`SubmatrixCut`]s. Every cut is checked against the arena, and the local offsets against the
//! compact buffer, before anything is read or written, so a malformed cut leaves both buffers
//! untouched.
//!
//! None of the functions here lock. Scatters of two tasks whose cuts overlap must not run
//! concurrently into the same global buffer; the integrator gives every lane its own
//! accumulator for that reason.

use itertools::Itertools;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::error::XcTaskError;
use crate::submatrix::{total_extent, unflatten_cuts, validate_cuts, SubmatrixCut};
use crate::task::Task;


// =================
// Bounds validation
// =================

/// Checks that every cut lies inside a global dimension of size `global_dim`.
///
/// # Errors
///
/// Errors with [`XcTaskError::PackingBounds`] naming the first offending cut. A cut whose end
/// overflows is out of range.
pub fn check_cuts(cuts: &[SubmatrixCut], global_dim: usize) -> Result<(), XcTaskError> {
    match cuts.iter().find_position(|cut| {
        cut.checked_global_end()
            .map_or(true, |end| end > global_dim)
    }) {
        Some((icut, cut)) => Err(XcTaskError::PackingBounds {
            task: None,
            cut: icut,
            global_offset: cut.global_offset,
            extent: cut.extent,
            global_dim,
        }),
        None => Ok(()),
    }
}

/// Checks the cuts against the global dimension, then checks that their local offsets tile the
/// compact index space. Returns the compact dimension $`n_{\mathrm{be}}`$.
fn check_layout(cuts: &[SubmatrixCut], global_dim: usize) -> Result<usize, XcTaskError> {
    check_cuts(cuts, global_dim)?;
    let nbe = total_extent(cuts);
    validate_cuts(cuts, nbe)?;
    Ok(nbe)
}

fn check_compact_dim(what: &str, found: usize, expected: usize) -> Result<(), XcTaskError> {
    if found != expected {
        return Err(XcTaskError::Configuration(format!(
            "{what} has size {found} instead of {expected}"
        )));
    }
    Ok(())
}

// =============
// Matrix blocks
// =============

/// Gathers the compact $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$ block of a task out of a
/// global matrix, over the full Cartesian product of row cuts and column cuts.
///
/// # Errors
///
/// Errors if a cut falls outside the global matrix or the local offsets of the cuts do not tile
/// the compact block.
pub fn gather(task: &Task, global: &ArrayView2<f64>) -> Result<Array2<f64>, XcTaskError> {
    gather_cuts(&task.cuts, global)
}

/// Gathers over an explicit cut sequence. See [`gather`].
pub fn gather_cuts(
    cuts: &[SubmatrixCut],
    global: &ArrayView2<f64>,
) -> Result<Array2<f64>, XcTaskError> {
    let (nrows, ncols) = global.dim();
    let nbe = check_layout(cuts, nrows.min(ncols))?;
    let mut compact = Array2::<f64>::zeros((nbe, nbe));
    for (row, col) in cuts.iter().cartesian_product(cuts.iter()) {
        compact
            .slice_mut(s![row.local_offset..row.local_end(), col.local_offset..col.local_end()])
            .assign(&global.slice(s![
                row.global_offset..row.global_end(),
                col.global_offset..col.global_end()
            ]));
    }
    Ok(compact)
}

/// Accumulates a compact $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$ contribution of a task into
/// a global matrix (`+=`). Entries outside the task's cuts are not touched.
///
/// # Errors
///
/// Errors if a cut falls outside the global matrix, the local offsets do not tile the compact
/// block, or the compact buffer is not $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$. Nothing is
/// written in any of these cases.
pub fn scatter_add(
    task: &Task,
    compact: &ArrayView2<f64>,
    global: &mut ArrayViewMut2<f64>,
) -> Result<(), XcTaskError> {
    scatter_add_cuts(&task.cuts, compact, global)
}

/// Scatter-accumulates over an explicit cut sequence. See [`scatter_add`].
pub fn scatter_add_cuts(
    cuts: &[SubmatrixCut],
    compact: &ArrayView2<f64>,
    global: &mut ArrayViewMut2<f64>,
) -> Result<(), XcTaskError> {
    let (nrows, ncols) = global.dim();
    let nbe = check_layout(cuts, nrows.min(ncols))?;
    check_compact_dim("compact row space", compact.nrows(), nbe)?;
    check_compact_dim("compact column space", compact.ncols(), nbe)?;
    for (row, col) in cuts.iter().cartesian_product(cuts.iter()) {
        let mut block = global.slice_mut(s![
            row.global_offset..row.global_end(),
            col.global_offset..col.global_end()
        ]);
        block += &compact.slice(s![
            row.local_offset..row.local_end(),
            col.local_offset..col.local_end()
        ]);
    }
    Ok(())
}

// =========================
// Per-function rows/vectors
// =========================

/// Gathers the rows of the task's significant functions out of an
/// $`n_{\mathrm{bf}} \times k`$ global array.
pub fn gather_rows(task: &Task, global: &ArrayView2<f64>) -> Result<Array2<f64>, XcTaskError> {
    let nbe = check_layout(&task.cuts, global.nrows())?;
    let mut compact = Array2::<f64>::zeros((nbe, global.ncols()));
    for cut in task.cuts.iter() {
        compact
            .slice_mut(s![cut.local_offset..cut.local_end(), ..])
            .assign(&global.slice(s![cut.global_offset..cut.global_end(), ..]));
    }
    Ok(compact)
}

/// Accumulates an $`n_{\mathrm{be}} \times k`$ compact array into the rows of the task's
/// significant functions of an $`n_{\mathrm{bf}} \times k`$ global array.
pub fn scatter_add_rows(
    task: &Task,
    compact: &ArrayView2<f64>,
    global: &mut ArrayViewMut2<f64>,
) -> Result<(), XcTaskError> {
    let nbe = check_layout(&task.cuts, global.nrows())?;
    check_compact_dim("compact row space", compact.nrows(), nbe)?;
    if compact.ncols() != global.ncols() {
        return Err(XcTaskError::Configuration(format!(
            "compact array has {} columns but the global array has {}",
            compact.ncols(),
            global.ncols()
        )));
    }
    for cut in task.cuts.iter() {
        let mut block = global.slice_mut(s![cut.global_offset..cut.global_end(), ..]);
        block += &compact.slice(s![cut.local_offset..cut.local_end(), ..]);
    }
    Ok(())
}

/// Gathers the entries of the task's significant functions out of a per-function vector.
pub fn gather_vector(task: &Task, global: &ArrayView1<f64>) -> Result<Array1<f64>, XcTaskError> {
    let nbe = check_layout(&task.cuts, global.len())?;
    let mut compact = Array1::<f64>::zeros(nbe);
    for cut in task.cuts.iter() {
        compact
            .slice_mut(s![cut.local_offset..cut.local_end()])
            .assign(&global.slice(s![cut.global_offset..cut.global_end()]));
    }
    Ok(compact)
}

/// Accumulates a compact per-function vector into a global one.
pub fn scatter_add_vector(
    task: &Task,
    compact: &ArrayView1<f64>,
    global: &mut ArrayViewMut1<f64>,
) -> Result<(), XcTaskError> {
    let nbe = check_layout(&task.cuts, global.len())?;
    check_compact_dim("compact vector", compact.len(), nbe)?;
    for cut in task.cuts.iter() {
        let mut block = global.slice_mut(s![cut.global_offset..cut.global_end()]);
        block += &compact.slice(s![cut.local_offset..cut.local_end()]);
    }
    Ok(())
}

// ===================
// Flat strided arenas
// ===================

/// Checks that a flat row-major arena of length `len` holds a `dim` x `dim` matrix whose rows
/// start `stride` entries apart. Entries past the end of a row are padding.
fn check_arena(len: usize, dim: usize, stride: usize) -> Result<(), XcTaskError> {
    let required = match dim.checked_sub(1) {
        None => Some(0),
        Some(last_row) => last_row
            .checked_mul(stride)
            .and_then(|start| start.checked_add(dim)),
    };
    match required {
        Some(required) if stride >= dim && len >= required => Ok(()),
        _ => Err(XcTaskError::Configuration(format!(
            "global arena of length {len} cannot hold a {dim} x {dim} matrix with stride {stride}"
        ))),
    }
}

/// Gathers a compact row-major $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$ block out of a flat
/// row-major arena, using flattened `[global_offset, extent, local_offset]` cut triples.
///
/// # Arguments
///
/// * `flat_cuts` - The flattened cuts.
/// * `global` - The global arena.
/// * `global_dim` - The dimension of the square matrix held in the arena.
/// * `global_stride` - The distance between the starts of consecutive rows, at least `global_dim`.
///
/// # Errors
///
/// Errors if the arena is too short for `global_dim` and `global_stride`, or if a cut is out of
/// range or malformed.
pub fn gather_strided(
    flat_cuts: &[usize],
    global: &[f64],
    global_dim: usize,
    global_stride: usize,
) -> Result<Vec<f64>, XcTaskError> {
    let cuts = unflatten_cuts(flat_cuts)?;
    check_arena(global.len(), global_dim, global_stride)?;
    let nbe = check_layout(&cuts, global_dim)?;
    let mut compact = vec![0.0; nbe * nbe];
    for (row, col) in cuts.iter().cartesian_product(cuts.iter()) {
        for i in 0..row.extent {
            let src = (row.global_offset + i) * global_stride + col.global_offset;
            let dst = (row.local_offset + i) * nbe + col.local_offset;
            compact[dst..dst + col.extent].copy_from_slice(&global[src..src + col.extent]);
        }
    }
    Ok(compact)
}

/// Accumulates a compact row-major block into a flat row-major arena. The counterpart of
/// [`gather_strided`]; padding entries are never written.
pub fn scatter_add_strided(
    flat_cuts: &[usize],
    compact: &[f64],
    global: &mut [f64],
    global_dim: usize,
    global_stride: usize,
) -> Result<(), XcTaskError> {
    let cuts = unflatten_cuts(flat_cuts)?;
    check_arena(global.len(), global_dim, global_stride)?;
    let nbe = check_layout(&cuts, global_dim)?;
    check_compact_dim("compact buffer", compact.len(), nbe * nbe)?;
    for (row, col) in cuts.iter().cartesian_product(cuts.iter()) {
        for i in 0..row.extent {
            let dst = (row.global_offset + i) * global_stride + col.global_offset;
            let src = (row.local_offset + i) * nbe + col.local_offset;
            global[dst..dst + col.extent]
                .iter_mut()
                .zip(compact[src..src + col.extent].iter())
                .for_each(|(g, c)| *g += c);
        }
    }
    Ok(())
}
