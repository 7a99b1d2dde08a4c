use std::env;
use std::path::{Path, PathBuf};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <kernel_binary> <output_image> [--uefi]", args[0]);
        eprintln!(
            "Example: {} target/x86_64-unknown-none/debug/simple_net_os target/x86_64-unknown-none/debug/simple_net_os-bios.img",
            args[0]
        );
        std::process::exit(1);
    }

    let kernel_path = PathBuf::from(&args[1]);
    let image_path = PathBuf::from(&args[2]);
    let uefi = args.iter().skip(3).any(|arg| arg == "--uefi");

    if !kernel_path.exists() {
        eprintln!("Error: Kernel binary not found: {:?}", kernel_path);
        std::process::exit(1);
    }

    println!("Creating {} disk image...", if uefi { "UEFI" } else { "BIOS" });
    println!("  Kernel: {:?}", kernel_path);
    println!("  Output: {:?}", image_path);

    match create_disk_image(&kernel_path, &image_path, uefi) {
        Ok(()) => {
            println!("Disk image created successfully!");
            println!("Run with: qemu-system-x86_64 -drive format=raw,file={} -serial stdio -nic user,model=e1000", image_path.display());
        }
        Err(e) => {
            eprintln!("Error creating disk image: {}", e);
            std::process::exit(1);
        }
    }
}

fn create_disk_image(kernel: &Path, output: &Path, uefi: bool) -> Result<(), Box<dyn std::error::Error>> {
    if uefi {
        bootloader::UefiBoot::new(kernel).create_disk_image(output)?;
    } else {
        bootloader::BiosBoot::new(kernel).create_disk_image(output)?;
    }
    Ok(())
}
