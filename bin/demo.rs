//! Small driver exercising the four tree operations from one thread.
//!
//! Run with:
//! ```bash
//! cargo run --bin demo
//! RUST_LOG=latchtree=trace cargo run --bin demo --features tracing
//! ```

use latchtree::LatchTree;

fn main() {
    let tree = LatchTree::new();

    for (key, value) in [
        ("d", "delta"),
        ("b", "bravo"),
        ("a", "alpha"),
        ("c", "charlie"),
        ("e", "echo"),
    ] {
        let outcome = tree.insert(key, value);
        println!("insert {key} -> {value}: {outcome:?}");
    }

    match tree.get(&"c") {
        Some(value) => println!("lookup c -> {value}"),
        None => println!("lookup c -> (absent)"),
    }

    match tree.remove(&"b") {
        Some(old) => println!("deleted b (held {old})"),
        None => println!("b was not present"),
    }

    println!("{} keys before clear", tree.len());
    tree.clear_with(|value| println!("releasing {value}"));
    println!("empty: {}", tree.is_empty());
}
