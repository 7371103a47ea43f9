//! Basic usage examples for vmcache.

use std::sync::Arc;

use critnib::Critnib;
use vmcache::{CacheEntry, CacheIndex, Config, Heap, Region};

fn main() {
    example_cache_flow();
    example_heap();
    example_critnib();
}

fn example_cache_flow() {
    println!("=== Region + Heap + CacheIndex ===\n");

    let config = Config {
        pool_size: 1 << 20,
        fragment_size: 64,
    };
    let mut region = Region::with_config(&config).unwrap();
    let heap = region.heap(config.fragment_size).unwrap();
    let index = CacheIndex::new();

    for (key, value) in [
        (&b"user:1001"[..], &b"alice"[..]),
        (b"user:1002", b"bob"),
        (b"user:1003", b"carol"),
    ] {
        let fragment = heap.alloc(value.len()).unwrap();
        region.write(fragment, value).unwrap();
        index
            .insert(Arc::new(CacheEntry::new(key, fragment, value.len())))
            .unwrap();
    }

    // Lookups
    if let Some(entry) = index.get(b"user:1002") {
        let value = region.read(entry.fragment(), entry.value_len()).unwrap();
        println!("user:1002 = {:?}", String::from_utf8_lossy(value));
    }
    println!("user:9999 = {:?}", index.get(b"user:9999").map(|e| e.fragment()));
    println!("Count: {}, bytes used: {}", index.len(), heap.used_size());

    // Eviction
    let entry = index.get(b"user:1001").unwrap();
    index.remove(&entry).unwrap();
    heap.free(entry.fragment());
    println!("After evicting user:1001: count {}, bytes used: {}\n", index.len(), heap.used_size());
}

fn example_heap() {
    println!("=== Heap ===\n");

    let heap = Heap::new(0, 1024, 64).unwrap();
    let first = heap.alloc(100).unwrap();
    println!("alloc(100) = {:?}", first);
    println!("free bytes: {}", heap.free_size());
    println!("alloc(900) = {:?}", heap.alloc(900));
    heap.free(first);
    println!("after free: {} fragments, {} bytes used\n", heap.fragment_count(), heap.used_size());
}

fn example_critnib() {
    println!("=== Critnib (raw tree) ===\n");

    let mut tree: Critnib<Vec<u8>, u64> = Critnib::new();
    tree.set(b"http://example.com/page1".to_vec(), 1).unwrap();
    tree.set(b"http://example.com/page2".to_vec(), 2).unwrap();
    tree.set(b"http://other.com/page1".to_vec(), 3).unwrap();

    // Raw keys must not be prefixes of each other.
    let conflict = tree.set(b"http://example.com".to_vec(), 4);
    println!("prefix insert: {:?}", conflict);

    println!("example.com/page1 = {:?}", tree.get(b"http://example.com/page1"));
    println!("other.com/page1 = {:?}", tree.get(b"http://other.com/page1"));
    println!("Count: {}, height: {}", tree.len(), tree.height());
    for (key, value) in tree.iter() {
        println!("  {} -> {}", String::from_utf8_lossy(key), value);
    }
}
