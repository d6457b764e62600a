use replacer::{FrameId, LruKReplacer, Replacer};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn disjoint_access_storms_track_every_frame() {
    let frames_per_thread = 64;
    let threads = 4;
    let replacer = Arc::new(LruKReplacer::new(threads * frames_per_thread, 2));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..frames_per_thread {
                    let frame_id = t * frames_per_thread + i;
                    // Uneven access counts spread frames across both
                    // working sets.
                    for _ in 0..=i % 3 {
                        replacer.record_access(frame_id).unwrap();
                    }
                    replacer.set_evictable(frame_id, true).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), threads * frames_per_thread);
}

#[test]
fn parallel_eviction_yields_distinct_victims() {
    let total = 64;
    let replacer = Arc::new(LruKReplacer::new(total, 2));
    for frame_id in 0..total {
        replacer.record_access(frame_id).unwrap();
        replacer.set_evictable(frame_id, true).unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                let mut victims = Vec::new();
                while let Some(frame_id) = replacer.evict() {
                    victims.push(frame_id);
                }
                victims
            })
        })
        .collect();

    let mut victims: Vec<FrameId> = Vec::new();
    for handle in handles {
        victims.extend(handle.join().unwrap());
    }

    assert_eq!(victims.len(), total);
    let distinct: HashSet<FrameId> = victims.iter().copied().collect();
    assert_eq!(distinct.len(), total);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn works_behind_the_trait_object() {
    let replacer = LruKReplacer::new(4, 2);
    let policy: &dyn Replacer = &replacer;

    policy.record_access(0).unwrap();
    policy.record_access(1).unwrap();
    policy.set_evictable(0, true).unwrap();
    policy.set_evictable(1, true).unwrap();

    assert_eq!(policy.size(), 2);
    assert_eq!(policy.evict(), Some(0));
    assert_eq!(policy.evict(), Some(1));
    assert_eq!(policy.evict(), None);
}
