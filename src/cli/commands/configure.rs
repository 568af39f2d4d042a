use anyhow::{Result, bail};

use super::super::utils::run_on_worker;
use crate::disk::format::parse_requested;
use crate::disk::session::{DiskRequest, DiskSession};

pub(super) async fn handle_fstab(session: DiskSession, print: bool) -> Result<()> {
    if print {
        let store = session.load_store()?;
        print!("{}", session.render_fstab(&store));
        return Ok(());
    }
    run_on_worker(session, DiskRequest::RegenerateFstab).await?;
    Ok(())
}

pub(super) async fn handle_set(
    session: DiskSession,
    device: String,
    mountpoint: Option<String>,
    no_mount: bool,
    bootable: Option<bool>,
    fstype: Option<String>,
) -> Result<()> {
    let mut requests = Vec::new();
    if mountpoint.is_some() || no_mount {
        requests.push(DiskRequest::SetMountpoint {
            device: device.clone(),
            mountpoint,
        });
    }
    if let Some(bootable) = bootable {
        requests.push(DiskRequest::SetBootable {
            device: device.clone(),
            bootable,
        });
    }
    if let Some(name) = fstype {
        requests.push(DiskRequest::SetFstype {
            device: device.clone(),
            fstype: parse_requested(&name)?,
        });
    }
    if requests.is_empty() {
        bail!("nothing to change; pass --mount, --no-mount, --bootable or --fs");
    }

    for request in requests {
        run_on_worker(session.clone(), request).await?;
    }
    Ok(())
}
