//! Walks through prewarming, acquiring and releasing with a bounded pool, then prints the
//! collected metrics.

use asset_pool::{AssetKey, AssetPool, Placement, PoolObject};
use futures::executor::block_on;
use nm::Report;
use testing::{FakeHost, FakeInstantiator, FakeLoader};

fn main() {
    let host = FakeHost::new();
    let pool = AssetPool::builder(FakeLoader::new(&host), FakeInstantiator::new(&host))
        .max_pool_size(2)
        .build();

    let cube = AssetKey::new("cube");

    block_on(async {
        pool.prewarm(&cube, 3).await.unwrap();

        let mut cubes = Vec::new();

        for i in 0..3_u8 {
            let placement = Placement::new().position([f32::from(i), 0.0, 0.0]);
            cubes.push(pool.acquire(&cube, &placement).await.unwrap());
        }

        println!("pooled after acquiring: {}", pool.pooled_count(&cube));

        for object in &cubes {
            pool.release(object).unwrap();
        }

        println!("pooled after releasing: {}", pool.pooled_count(&cube));
        println!(
            "destroyed because the pool was full: {}",
            cubes.iter().filter(|object| !object.is_alive()).count()
        );
    });

    pool.shutdown();

    println!("{}", Report::collect());
}
