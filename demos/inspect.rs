use std::io::Read;
use std::ptr;

use libc::sbrk;
use segalloc::Allocator;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  let allocator = Allocator::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32.
    // --------------------------------------------------------------------
    let first_block = allocator.allocate(4);
    println!(
      "\n[1] Allocate u32 -> {:?} (live={}, free={})",
      first_block,
      allocator.allocated_bytes(),
      allocator.free_bytes(),
    );

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes to show how the allocator handles odd sizes.
    // --------------------------------------------------------------------
    let second_block = allocator.allocate(12);
    println!("\n[2] Allocate [u8; 12] -> {:?}", second_block);
    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Deallocate the first block.
    //
    //    `first_block` is no longer topmost (`second_block` is), so this
    //    parks it in the free-list index instead of shrinking the break.
    // --------------------------------------------------------------------
    allocator.release(first_block);
    println!("\n[3] Released first_block at {:?} (free={})", first_block, allocator.free_bytes());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate a small block to see if the allocator reuses the freed one.
    // --------------------------------------------------------------------
    let third_block = allocator.allocate(2);
    println!("\n[4] Allocate [u8; 2] -> {:?}", third_block);
    println!(
      "[4] third_block == first_block? {}",
      if third_block == first_block {
        "Yes, it reused the parked block"
      } else {
        "No, it took a different (wider) bucket match or grew the heap"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate a large block to observe heap growth.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = allocator.allocate(64 * 1024);
    println!("\n[5] Allocate 64 KiB -> {:?}", big_block);
    print_program_break("after large alloc");
    block_until_enter_pressed();

    println!("\n[6] End of demo. Process will exit and the OS will reclaim all memory.");
  }
}
