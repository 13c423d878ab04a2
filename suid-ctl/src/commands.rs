use log::info;
use std::fs::File;
use std::io;
use std::path::Path;

use suid_launch::{Probe, SelfProbe, SystemCapabilities, util};

pub fn check_requirements() {
    info!("Checking launch requirements");
    println!("Checking launch requirements...\n");

    let caps = SystemCapabilities::detect();
    println!("{}", caps.summary());

    if !caps.can_change_identity() {
        println!("\nNot running as root: only the caller's own identity can be requested");
    }
    if !caps.honors_setuid_bits() {
        println!("no_new_privs is set: setuid targets run without escalation");
    }

    println!("\nSystem info:");
    println!("  UID: {} (effective {})", util::get_uid(), util::get_euid());
    println!("  GID: {} (effective {})", util::get_gid(), util::get_egid());
}

pub fn probe(output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let observation = SelfProbe.observe()?;
    match output {
        Some(path) => {
            info!("Writing observation to {}", path.display());
            observation.write_to(File::create(path)?)?;
        }
        None => observation.write_to(io::stdout().lock())?,
    }
    Ok(())
}
