//! Installs [`MapAlloc`] as the global allocator and runs ordinary std code on top of it.

use mapalloc::MapAlloc;
use std::thread;

#[global_allocator]
static ALLOCATOR: MapAlloc = MapAlloc::new();

fn main() {
    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    let p1 = Box::new(2.22);
    let addr_p1 = format!("{:p}", p1);
    println!("P1 Allocated at: {}", addr_p1);

    drop(p1);
    println!("P1 Deallocated");

    let p2 = Box::new(2.22);
    println!("P2 at: {:p}", p2);

    // Merge example
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    let ptr_c = c.as_ptr();

    if ptr_a == ptr_c {
        println!("Correctly reused at {:p}", ptr_c);
    } else {
        println!("Not reused. A was at {:p} and C is at {:p}", ptr_a, ptr_c);
    }

    // Large blocks get a mapping of their own.
    let big = vec![1u64; 4096];
    println!("Large Vec of {} bytes at {:p}", big.len() * 8, big.as_ptr());
    drop(big);

    // Thread example
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let data: Vec<u32> = (0..1000).map(|n| n * i).collect();
                data.iter().sum::<u32>()
            })
        })
        .collect();

    for handle in handles {
        println!("Thread sum: {}", handle.join().unwrap());
    }

    println!("Free blocks left: {}", ALLOCATOR.free_block_count());
}
