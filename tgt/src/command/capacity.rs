use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::core::mountpath::MountpathRegistry;

/// Offline capacity check of a set of mountpaths.
#[derive(Parser, Debug, Clone)]
pub struct CapacityArgs {
    #[arg(long = "mountpath", required = true)]
    pub mountpaths: Vec<PathBuf>,

    #[arg(long, default_value_t = 0)]
    pub capacity_bytes: u64,

    #[arg(long, default_value_t = 90)]
    pub highwm: u32,

    #[arg(long, default_value_t = 95)]
    pub oos: u32,
}

pub fn capacity(args: CapacityArgs) -> anyhow::Result<()> {
    let registry = MountpathRegistry::new(
        args.mountpaths,
        args.capacity_bytes,
        args.highwm,
        args.oos,
    )?;
    let cs = registry.refresh_cap();

    info!(
        "capacity: {}% used (high-wm {}%, oos {}%)",
        cs.used_pct, args.highwm, args.oos
    );
    if let Some(err) = cs.err() {
        anyhow::bail!(err.to_string());
    }
    Ok(())
}
