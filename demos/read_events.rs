//! Print the event stream of one device.
//!
//! Run with: cargo run --example read_events -- /dev/input/event3 [--grab]
//!
//! With `--grab` the device is taken exclusively, so its events stop
//! reaching other applications until the example exits. Press Ctrl+C to
//! exit.

use evdevkit::{Registry, discovery};
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const DEVICE: u32 = 1;

fn wait_readable(fd: RawFd, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid pollfd for the whole call and nfds is 1.
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(ret > 0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().unwrap_or_else(|| "/dev/input/event0".into()));
    let grab = args.any(|arg| arg == "--grab");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Handle Ctrl+C
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        println!("\nStopping...");
    })
    .expect("Error setting Ctrl-C handler");

    let mut registry = Registry::new();
    registry.new_context(DEVICE)?;
    registry.bind(DEVICE, discovery::open_device_node(&path)?)?;
    if grab {
        registry.grab(DEVICE, true)?;
    }

    println!("evdevkit event reader");
    println!("=====================\n");
    println!("Device: {} ({})", registry.identity(DEVICE)?.name, path.display());
    println!("Press Ctrl+C to exit.\n");

    let fd = registry.raw_fd(DEVICE)?;
    let mut count = 0u64;
    while running.load(Ordering::SeqCst) {
        if !wait_readable(fd, 100)? {
            continue;
        }
        while let Some(event) = registry.next_event(DEVICE)? {
            count += 1;
            if event.is_syn_report() {
                println!("-------------- SYN_REPORT ------------");
            } else {
                println!("{}", event);
            }
        }
    }

    if grab {
        registry.grab(DEVICE, false)?;
    }
    println!("{} events read", count);
    Ok(())
}
