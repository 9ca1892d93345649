// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for the chunk planner and grid synthesizer.

use gridbench_core::{BenchError, ChunkGeometry, GridSpec, synthesize, validate};
use proptest::prelude::*;

proptest! {
    #[test]
    fn validate_accepts_exactly_blocks_within_axes(
        time in 1usize..40,
        lat in 1usize..40,
        lon in 1usize..40,
        bt in 0usize..50,
        by in 0usize..50,
        bx in 0usize..50,
    ) {
        let spec = GridSpec::with_shape(time, lat, lon);
        let geometry = ChunkGeometry::new(bt, by, bx);
        let expected = (1..=time).contains(&bt) && (1..=lat).contains(&by) && (1..=lon).contains(&bx);
        match validate(geometry, &spec) {
            Ok(returned) => {
                prop_assert!(expected);
                prop_assert_eq!(returned, geometry);
            }
            Err(err) => {
                prop_assert!(!expected);
                let is_geometry_error = matches!(err, BenchError::InvalidChunkGeometry { .. });
                prop_assert!(is_geometry_error);
            }
        }
    }

    #[test]
    fn blocks_partition_the_grid(
        time in 1usize..30,
        lat in 1usize..30,
        lon in 1usize..30,
        bt in 1usize..30,
        by in 1usize..30,
        bx in 1usize..30,
    ) {
        let shape = [time, lat, lon];
        let geometry = ChunkGeometry::new(bt.min(time), by.min(lat), bx.min(lon));
        let covered: usize = geometry.blocks(shape).map(|(_, region)| region.len()).sum();
        prop_assert_eq!(covered, time * lat * lon);
        prop_assert_eq!(geometry.blocks(shape).count(), geometry.block_count(shape));
    }

    #[test]
    fn synthesized_axes_are_increasing_and_inclusive(
        time in 1usize..5,
        lat in 2usize..200,
        lon in 2usize..400,
    ) {
        let spec = GridSpec::with_shape(time, lat, lon);
        let ds = synthesize(&spec, Some(1)).unwrap();
        prop_assert_eq!(ds.shape(), [time, lat, lon]);
        prop_assert!(ds.lat().windows(2).all(|w| w[0] < w[1]));
        prop_assert!(ds.lon().windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(ds.lat()[0], spec.lat.min);
        prop_assert_eq!(ds.lat()[lat - 1], spec.lat.max);
        prop_assert_eq!(ds.lon()[0], spec.lon.min);
        prop_assert_eq!(ds.lon()[lon - 1], spec.lon.max);
    }
}
