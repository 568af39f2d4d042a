mod configure;
mod inspect;
mod mount;
mod partition;

use anyhow::Result;

use super::utils::{build_session, ensure_root, load_settings};
use super::{Commands, GlobalArgs};

pub async fn handle_command(command: Commands, args: &GlobalArgs) -> Result<()> {
    let settings = load_settings(args)?;
    if command.needs_root() && !settings.dry_run {
        ensure_root()?;
    }

    if let Commands::Settings = command {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let session = build_session(settings);
    match command {
        Commands::Disks => inspect::handle_disks(&session),
        Commands::Free { disk } => inspect::handle_free(&session, &disk),
        Commands::Parse { device } => inspect::handle_parse(&device),
        Commands::BootMode => inspect::handle_boot_mode(&session),
        Commands::Tools => inspect::handle_tools(),
        Commands::Validate => inspect::handle_validate(&session),
        Commands::Fstab { print } => configure::handle_fstab(session, print).await,
        Commands::Set {
            device,
            mountpoint,
            no_mount,
            bootable,
            fstype,
        } => configure::handle_set(session, device, mountpoint, no_mount, bootable, fstype).await,
        Commands::Mklabel { disk, table } => partition::handle_mklabel(session, disk, table).await,
        Commands::Create {
            disk,
            size,
            fstype,
            mountpoint,
            bootable,
            region,
        } => {
            partition::handle_create(
                session,
                partition::CreateArgs {
                    disk,
                    size,
                    fstype,
                    mountpoint,
                    bootable,
                    region,
                },
            )
            .await
        }
        Commands::Remove { device } => partition::handle_remove(session, device).await,
        Commands::Format { device, fstype } => {
            partition::handle_format(session, device, fstype).await
        }
        Commands::Auto {
            disk,
            preset,
            root_fs,
            keep_table,
        } => partition::handle_auto(session, disk, &preset, &root_fs, keep_table).await,
        Commands::MountTarget { fstab, target } => {
            mount::handle_mount_target(session, fstab, target).await
        }
        Commands::Settings => Ok(()),
    }
}
