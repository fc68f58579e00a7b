use std::path::Path;
use std::sync::Arc;

use crate::core::mount::Mounter;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::CifsMounter;
pub use simulated::SimulatedMounter;

/// Directory under the mount base that stands in for the share in simulation mode.
pub const SIMULATED_SHARE_DIR: &str = "smbbk-simulated-share";

pub fn get_mounter(simulation: bool, mount_base: &Path) -> anyhow::Result<Arc<dyn Mounter>> {
    if simulation {
        let remote_root = mount_base.join(SIMULATED_SHARE_DIR);
        std::fs::create_dir_all(&remote_root)?;
        tracing::info!(share = %remote_root.display(), "(Simulator) Using local directory as share");
        return Ok(Arc::new(SimulatedMounter::new(remote_root)));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(CifsMounter::default()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("CIFS mounting is only supported on Linux; use --simulation")
    }
}
