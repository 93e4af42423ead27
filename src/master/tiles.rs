// CLASSIFICATION: COMMUNITY
// Filename: tiles.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-02-25

//! Screen-tile assignment by alternating-axis bisection.

use anyhow::{bail, Result};
use glam::IVec2;

use swarm_model::Bounds2i;

/// Compute the bounds of tile `tile_index` when `bounds` is split into
/// `tile_count` tiles.
///
/// The rectangle is bisected along the current axis (vertically first, i.e.
/// splitting y), even indices recurse into the first half and odd into the
/// second, and the axis alternates at each level. Every pixel of `bounds`
/// lands in exactly one tile and tiles stay approximately area-balanced.
///
/// Fails when a bisection would split an axis of length one, which would
/// produce a zero-width tile.
pub fn get_tile(tile_index: u32, tile_count: u32, bounds: Bounds2i) -> Result<Bounds2i> {
    get_tile_inner(tile_index, tile_count, bounds, true)
}

fn get_tile_inner(
    tile_index: u32,
    tile_count: u32,
    bounds: Bounds2i,
    split_vertical: bool,
) -> Result<Bounds2i> {
    if tile_count <= 1 {
        return Ok(bounds);
    }

    let (first, second) = if split_vertical {
        let y_mid = (bounds.min.y + bounds.max.y) / 2;
        if y_mid == bounds.min.y || y_mid == bounds.max.y {
            bail!("tried to split a rectangle across an axis of length 1");
        }
        (
            Bounds2i::new(bounds.min, IVec2::new(bounds.max.x, y_mid)),
            Bounds2i::new(IVec2::new(bounds.min.x, y_mid), bounds.max),
        )
    } else {
        let x_mid = (bounds.min.x + bounds.max.x) / 2;
        if x_mid == bounds.min.x || x_mid == bounds.max.x {
            bail!("tried to split a rectangle across an axis of length 1");
        }
        (
            Bounds2i::new(bounds.min, IVec2::new(x_mid, bounds.max.y)),
            Bounds2i::new(IVec2::new(x_mid, bounds.min.y), bounds.max),
        )
    };

    if tile_index % 2 == 0 {
        let even_tiles = tile_count - tile_count / 2;
        get_tile_inner(tile_index / 2, even_tiles, first, !split_vertical)
    } else {
        let odd_tiles = tile_count / 2;
        get_tile_inner(tile_index / 2, odd_tiles, second, !split_vertical)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn bounds(w: i32, h: i32) -> Bounds2i {
        Bounds2i::new(IVec2::ZERO, IVec2::new(w, h))
    }

    fn assert_exact_partition(b: Bounds2i, tile_count: u32) {
        let mut owner: HashMap<(i32, i32), u32> = HashMap::new();
        for index in 0..tile_count {
            let tile = get_tile(index, tile_count, b).unwrap();
            assert!(tile.area() > 0, "tile {index} of {tile_count} is empty");
            for p in tile.pixels() {
                let prev = owner.insert((p.x, p.y), index);
                assert_eq!(prev, None, "pixel {p:?} in tiles {prev:?} and {index}");
            }
        }
        assert_eq!(owner.len() as i64, b.area(), "tiles do not cover the bounds");
    }

    #[test]
    fn seven_by_five_in_four_tiles() {
        let b = bounds(7, 5);
        assert_exact_partition(b, 4);
        // Vertical split first puts rows 0..2 in even tiles.
        let t0 = get_tile(0, 4, b).unwrap();
        assert_eq!(t0, Bounds2i::new(IVec2::ZERO, IVec2::new(3, 2)));
        let t3 = get_tile(3, 4, b).unwrap();
        assert_eq!(t3, Bounds2i::new(IVec2::new(3, 2), IVec2::new(7, 5)));
    }

    #[test]
    fn partitions_exactly_for_many_counts() {
        for count in 1..=9 {
            assert_exact_partition(bounds(16, 16), count);
        }
        for count in [1, 2, 3, 4, 5, 6] {
            assert_exact_partition(bounds(9, 11), count);
        }
    }

    #[test]
    fn single_tile_is_the_whole_bounds() {
        let b = bounds(3, 1);
        assert_eq!(get_tile(0, 1, b).unwrap(), b);
    }

    #[test]
    fn one_pixel_axis_is_a_domain_error() {
        // Splitting y on a height-1 image must fail, not produce a
        // zero-height tile.
        assert!(get_tile(0, 2, bounds(10, 1)).is_err());
        // Depth two alternates to x, so a 2x2 image cannot take 3 tiles'
        // second-level split of a width-1 half.
        assert!(get_tile(0, 4, bounds(2, 2)).is_ok());
        assert!(get_tile(0, 8, bounds(2, 2)).is_err());
    }

    #[test]
    fn offset_bounds_partition_too() {
        let b = Bounds2i::new(IVec2::new(3, 7), IVec2::new(12, 19));
        assert_exact_partition(b, 5);
    }
}
