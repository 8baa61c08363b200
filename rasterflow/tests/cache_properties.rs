//! Property tests for tile cache accounting and sample conversion.
//!
//! Run with: `cargo test --test cache_properties`

use proptest::prelude::*;

use rasterflow::cache::{CacheConfig, TileCache};
use rasterflow::raster::{DataType, Raster, Rectangle, Scaling};
use rasterflow::tile::{SampleBuffer, Tile};

/// One-byte samples so that tile size equals sample count.
fn byte_tile(cache: &TileCache, raster: &Raster, x: i32, size: usize) -> Tile {
    let rect = Rectangle::new(x, 0, size as i32, 1);
    cache.insert(raster, rect, SampleBuffer::zeroed(DataType::UInt8, size))
}

#[test]
fn test_capacity_law() {
    let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
    let raster = Raster::new("bytes", 4096, 1, DataType::UInt8);

    byte_tile(&cache, &raster, 0, 800);
    assert_eq!(cache.current_memory(), 800);

    byte_tile(&cache, &raster, 1000, 300);
    assert!(cache.current_memory() <= 1000);
    assert!(cache.contains(&raster, &Rectangle::new(1000, 0, 300, 1)));
    assert!(!cache.contains(&raster, &Rectangle::new(0, 0, 800, 1)));
    assert_eq!(cache.current_memory(), 300);
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_too_small_tile_not_cached() {
    let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
    let raster = Raster::new("bytes", 4096, 1, DataType::UInt8);

    let tile = byte_tile(&cache, &raster, 0, 5);
    assert_eq!(tile.rect().width, 5);
    assert_eq!(cache.current_memory(), 0);
    assert!(cache.lookup(&raster, &Rectangle::new(0, 0, 5, 1)).is_none());
}

proptest! {
    #[test]
    fn prop_memory_matches_entries_and_stays_bounded(
        sizes in prop::collection::vec(1usize..400, 1..60),
        capacity in 200usize..2000,
    ) {
        let cache = TileCache::new(CacheConfig::new(capacity, 0.75, 10));
        let raster = Raster::new("bytes", 1 << 20, 1, DataType::UInt8);

        for (i, size) in sizes.iter().enumerate() {
            byte_tile(&cache, &raster, (i * 512) as i32, *size);
            let stats = cache.stats();
            prop_assert!(stats.current_memory <= capacity);
            prop_assert_eq!(stats.insertions - stats.evictions, stats.entry_count as u64);
        }

        let resident: usize = sizes
            .iter()
            .enumerate()
            .filter(|(i, size)| {
                cache.contains(&raster, &Rectangle::new((*i * 512) as i32, 0, **size as i32, 1))
            })
            .map(|(_, size)| *size)
            .sum();
        prop_assert_eq!(resident, cache.current_memory());
    }

    #[test]
    fn prop_float_scaling_round_trips(
        value in -1.0e6f64..1.0e6,
        factor in 0.01f64..100.0,
        offset in -50.0f64..50.0,
    ) {
        let raster = Raster::builder("scaled", 2, 2, DataType::Float64)
            .scaling(Scaling::linear(factor, offset))
            .build();
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 2, 2));
        tile.set_sample(1, 1, value).unwrap();
        let back = tile.sample_double(1, 1);
        prop_assert!((back - value).abs() <= 1e-6 * value.abs().max(1.0));
    }

    #[test]
    fn prop_byte_samples_round_half_up_and_saturate(value in -1000.0f64..1000.0) {
        let raster = Raster::new("bytes", 1, 1, DataType::UInt8);
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 1, 1));
        tile.set_sample(0, 0, value).unwrap();
        let expected = (value + 0.5).floor().clamp(0.0, 255.0);
        prop_assert_eq!(tile.raw_sample_double(0, 0), expected);
    }
}
