use mapalloc::MapAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = MapAlloc::new();

    let addr1 = allocator.allocate(8).expect("out of memory").as_ptr();
    log_alloc(addr1, 8);

    let addr2 = allocator.allocate(16).expect("out of memory").as_ptr();
    log_alloc(addr2, 16);

    let addr3 = allocator.allocate_zeroed(4, 4).expect("out of memory").as_ptr();
    log_alloc(addr3, 16);

    let big = allocator.allocate(3 * 4096).expect("out of memory").as_ptr();
    log_alloc(big, 3 * 4096);

    unsafe {
        allocator.release(addr1);
        allocator.release(addr2);
        allocator.release(addr3);
        allocator.release(big);
    }

    allocator.for_each_free_block(|addr, size| {
        println!("Free block at {addr:#x}: {size} bytes");
    });
}
