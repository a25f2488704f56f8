//! List input devices and their capabilities.
//!
//! Run with: cargo run --example list_devices
//!
//! Every `/dev/input/event*` node that can be opened is bound to a context
//! and printed with its identity, event types, codes and properties. Nodes
//! that cannot be opened (usually a permissions problem) are skipped.

use evdevkit::{Registry, codes, discovery};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("evdevkit device list");
    println!("====================\n");

    let mut registry = Registry::new();
    let mut next_handle = 1;

    for path in discovery::event_nodes(Path::new("/dev/input"))? {
        let fd = match discovery::open_device_node(&path) {
            Ok(fd) => fd,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                continue;
            }
        };

        let handle = next_handle;
        registry.new_context(handle)?;
        if let Err(e) = registry.bind(handle, fd) {
            eprintln!("{}: {}", path.display(), e);
            registry.release(handle)?;
            continue;
        }
        next_handle += 1;

        let identity = registry.identity(handle)?;
        println!("{}", path.display());
        println!("  Name:    {}", identity.name);
        println!(
            "  Id:      bus {:#06x} vendor {:#06x} product {:#06x} version {:#06x}",
            identity.bustype, identity.vendor, identity.product, identity.version
        );
        if !identity.phys.is_empty() {
            println!("  Phys:    {}", identity.phys);
        }
        if !identity.uniq.is_empty() {
            println!("  Uniq:    {}", identity.uniq);
        }

        for ty in registry.capabilities(handle)? {
            println!(
                "  {} ({}): {} codes",
                codes::type_name(ty.event_type),
                ty.event_type,
                ty.codes.len()
            );
            for code in &ty.codes {
                let name = codes::code_name(ty.event_type, code.code);
                match code.abs_info {
                    Some(info) => println!(
                        "    {} ({}) min {} max {} fuzz {} flat {} res {}",
                        name, code.code, info.minimum, info.maximum, info.fuzz, info.flat,
                        info.resolution
                    ),
                    None => println!("    {} ({})", name, code.code),
                }
            }
        }

        for property in registry.properties(handle)? {
            println!("  Property: {}", codes::property_name(property));
        }
        println!();
    }

    let joysticks = registry.find_with_capability(codes::EV_KEY, Some(codes::BTN_SOUTH));
    println!(
        "{} device(s) listed, {} gamepad(s)",
        registry.context_handles().len(),
        joysticks.len()
    );

    Ok(())
}
