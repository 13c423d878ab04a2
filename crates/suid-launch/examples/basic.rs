//! Basic launch example

use suid_launch::{EnvironmentPolicy, ExecutionSpec, LaunchError, ProcessLauncher, util};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== suid-launch - Basic Example ===\n");

    let launcher = ProcessLauncher::new();

    // Our own identity always works; dropping to nobody needs root
    let (uid, gid) = if util::is_root() {
        (65534, 65534)
    } else {
        (util::get_uid(), util::get_gid())
    };

    println!("[1] Running /usr/bin/id as {}:{} in /tmp...", uid, gid);
    let spec = ExecutionSpec::builder("/usr/bin/id")
        .identity(uid, gid)
        .cwd("/tmp")
        .env_policy(EnvironmentPolicy::Explicit(Default::default()))
        .build();
    let status = launcher.launch(spec)?;
    println!("[*] Exit code: {} ({} ms)\n", status.code, status.exec_time_ms);

    println!("[2] Environment with only TERM set...");
    let spec = ExecutionSpec::builder("/usr/bin/env")
        .env_policy(EnvironmentPolicy::Explicit(
            [("TERM".to_string(), "xterm".to_string())].into_iter().collect(),
        ))
        .build();
    launcher.launch(spec)?;

    println!("\n[3] A target that kills itself...");
    let spec = ExecutionSpec::builder("/bin/sh")
        .args(["-c", "kill -KILL $$"])
        .build();
    match launcher.launch(spec) {
        Err(LaunchError::Signaled(signal)) => println!("[*] Killed by signal {}", signal),
        other => println!("[*] Unexpected result: {:?}", other),
    }

    Ok(())
}
