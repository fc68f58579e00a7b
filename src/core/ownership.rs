use nix::unistd::{Gid, Uid, User};
use tracing::debug;

/// Numeric owner that remote files are mapped to on the mounted share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerIds {
    pub uid: u32,
    pub gid: u32,
}

impl OwnerIds {
    /// Format as the `uid=..,gid=..` pair for mount options
    pub fn as_mount_options(&self) -> String {
        format!("uid={},gid={}", self.uid, self.gid)
    }
}

/// Determine the real user behind this process.
///
/// Detection order:
/// 1. `SUDO_UID` / `SUDO_GID` - set by sudo for the invoking user
/// 2. `SUDO_USER` - looked up in the user database
/// 3. The process's own real uid/gid
pub fn invoking_user() -> OwnerIds {
    if let Some(owner) = owner_from_sudo_ids() {
        debug!(uid = owner.uid, gid = owner.gid, "Detected invoking user from SUDO_UID");
        return owner;
    }

    if let Some(owner) = owner_from_sudo_user() {
        debug!(uid = owner.uid, gid = owner.gid, "Detected invoking user from SUDO_USER");
        return owner;
    }

    OwnerIds {
        uid: Uid::current().as_raw(),
        gid: Gid::current().as_raw(),
    }
}

fn owner_from_sudo_ids() -> Option<OwnerIds> {
    let uid = std::env::var("SUDO_UID").ok()?;
    let gid = std::env::var("SUDO_GID").ok()?;
    parse_ids(&uid, &gid)
}

fn owner_from_sudo_user() -> Option<OwnerIds> {
    let sudo_user = std::env::var("SUDO_USER").ok()?;

    if sudo_user.is_empty() {
        return None;
    }

    let user = User::from_name(&sudo_user).ok()??;

    Some(OwnerIds {
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    })
}

fn parse_ids(uid: &str, gid: &str) -> Option<OwnerIds> {
    Some(OwnerIds {
        uid: uid.trim().parse().ok()?,
        gid: gid.trim().parse().ok()?,
    })
}
