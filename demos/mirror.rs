//! Mirror a real device into a virtual one.
//!
//! Run with: cargo run --example mirror -- /dev/input/event3
//!
//! The source device is grabbed and every event it produces is replayed
//! into a virtual device with the same capabilities and identity, so the
//! rest of the system keeps working while this example sits in between.
//! Press Ctrl+C to exit.

use evdevkit::{Registry, discovery};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SOURCE: u32 = 1;
const MIRROR: u32 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "/dev/input/event0".into()),
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Handle Ctrl+C
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let mut registry = Registry::new();
    registry.new_context(SOURCE)?;
    registry.bind(SOURCE, discovery::open_device_node(&path)?)?;
    registry.create_virtual(SOURCE, MIRROR)?;

    // The kernel names the node asynchronously.
    let mut devnode = None;
    for _ in 0..20 {
        devnode = registry.dev_node(MIRROR)?;
        if devnode.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("evdevkit mirror example");
    println!("=======================\n");
    println!("Source: {} ({})", registry.identity(SOURCE)?.name, path.display());
    match &devnode {
        Some(node) => println!("Mirror: {}", node.display()),
        None => println!("Mirror: (node not assigned yet)"),
    }
    println!("Press Ctrl+C to exit.\n");

    registry.grab(SOURCE, true)?;

    let mut forwarded = 0u64;
    while running.load(Ordering::SeqCst) {
        match registry.next_event(SOURCE)? {
            Some(event) => {
                registry.write_event(MIRROR, event.event_type, event.code, event.value)?;
                forwarded += 1;
            }
            None => std::thread::sleep(Duration::from_millis(2)),
        }
    }

    registry.grab(SOURCE, false)?;
    registry.destroy(MIRROR)?;
    registry.release(SOURCE)?;
    println!("\nForwarded {} events", forwarded);
    Ok(())
}
