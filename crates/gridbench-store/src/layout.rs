// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row-major copies between a dense array and a sub-region.

use gridbench_core::{Region, Shape3};

/// Copy `region` out of a dense row-major array of `shape`.
#[must_use]
pub fn extract(src: &[f32], shape: Shape3, region: &Region) -> Vec<f32> {
    let mut out = vec![0.0; region.len()];
    copy_box(src, shape, region, &mut out, region.shape(), region.start);
    out
}

/// Copy the elements of `region` (absolute coordinates) from `src` into `dst`.
///
/// `src` is dense with `src_shape` starting at the origin; `dst` is dense
/// with `dst_shape` and its first element sits at absolute `dst_origin`.
/// Both arrays must contain `region`.
pub fn copy_box(
    src: &[f32],
    src_shape: Shape3,
    region: &Region,
    dst: &mut [f32],
    dst_shape: Shape3,
    dst_origin: Shape3,
) {
    copy_box_from(src, src_shape, [0; 3], region, dst, dst_shape, dst_origin);
}

/// As [`copy_box`], with `src` itself a sub-array whose first element sits at `src_origin`.
#[allow(clippy::too_many_arguments)]
pub fn copy_box_from(
    src: &[f32],
    src_shape: Shape3,
    src_origin: Shape3,
    region: &Region,
    dst: &mut [f32],
    dst_shape: Shape3,
    dst_origin: Shape3,
) {
    let width = region.shape()[2];
    if width == 0 {
        return;
    }
    let src_rel = region.relative_to(src_origin);
    let dst_rel = region.relative_to(dst_origin);
    for dt in 0..region.shape()[0] {
        for dy in 0..region.shape()[1] {
            let s = offset(src_shape, [src_rel.start[0] + dt, src_rel.start[1] + dy, src_rel.start[2]]);
            let d = offset(dst_shape, [dst_rel.start[0] + dt, dst_rel.start[1] + dy, dst_rel.start[2]]);
            dst[d..d + width].copy_from_slice(&src[s..s + width]);
        }
    }
}

/// Contiguous runs `(element offset, length)` covering `region` inside `shape`.
#[must_use]
pub fn runs(shape: Shape3, region: &Region) -> Vec<(usize, usize)> {
    let extent = region.shape();
    if region.is_empty() {
        return Vec::new();
    }
    if extent[2] == shape[2] && extent[1] == shape[1] {
        return vec![(offset(shape, region.start), region.len())];
    }
    if extent[2] == shape[2] {
        return (region.start[0]..region.end[0])
            .map(|t| (offset(shape, [t, region.start[1], 0]), extent[1] * extent[2]))
            .collect();
    }
    let mut out = Vec::with_capacity(extent[0] * extent[1]);
    for t in region.start[0]..region.end[0] {
        for y in region.start[1]..region.end[1] {
            out.push((offset(shape, [t, y, region.start[2]]), extent[2]));
        }
    }
    out
}

/// Row-major element offset of `index` in `shape`.
#[must_use]
pub const fn offset(shape: Shape3, index: Shape3) -> usize {
    (index[0] * shape[1] + index[1]) * shape[2] + index[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(shape: Shape3) -> Vec<f32> {
        (0..shape.iter().product::<usize>()).map(|i| i as f32).collect()
    }

    #[test]
    fn test_extract_matches_indexing() {
        let shape = [3, 4, 5];
        let src = iota(shape);
        let region = Region::new([1, 1, 2], [3, 3, 5]);
        let out = extract(&src, shape, &region);
        assert_eq!(out.len(), 2 * 2 * 3);
        assert_eq!(out[0], offset(shape, [1, 1, 2]) as f32);
        assert_eq!(out[out.len() - 1], offset(shape, [2, 2, 4]) as f32);
    }

    #[test]
    fn test_copy_between_sub_arrays() {
        let shape = [2, 4, 4];
        let full = iota(shape);
        let block_region = Region::new([0, 2, 0], [2, 4, 4]);
        let block = extract(&full, shape, &block_region);
        let wanted = Region::new([1, 3, 1], [2, 4, 3]);
        let mut out = vec![0.0; wanted.len()];
        copy_box_from(&block, block_region.shape(), block_region.start, &wanted, &mut out, wanted.shape(), wanted.start);
        assert_eq!(out, extract(&full, shape, &wanted));
    }

    #[test]
    fn test_runs_merge_contiguous_rows() {
        let shape = [4, 3, 5];
        assert_eq!(runs(shape, &Region::new([1, 0, 0], [3, 3, 5])), vec![(15, 30)]);
        assert_eq!(runs(shape, &Region::new([0, 1, 0], [2, 3, 5])).len(), 2);
        assert_eq!(runs(shape, &Region::new([0, 0, 1], [2, 3, 2])).len(), 6);
        let covered: usize = runs(shape, &Region::new([0, 1, 1], [4, 3, 4])).iter().map(|r| r.1).sum();
        assert_eq!(covered, 4 * 2 * 3);
    }
}
