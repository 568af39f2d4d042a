use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

/// A scratch directory holding a settings file whose store and fstab paths
/// point inside it.
struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    fn new() -> Result<Self> {
        let env = Self {
            temp_dir: tempfile::tempdir()?,
        };
        let settings = format!(
            "config_store_path = \"{}\"\nfstab_path = \"{}\"\ndry_run = true\n\n[mount_wait]\ntimeout_secs = 1\n",
            env.store_path().display(),
            env.fstab_path().display()
        );
        std::fs::write(env.settings_path(), settings)?;
        Ok(env)
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn settings_path(&self) -> PathBuf {
        self.path().join("settings.toml")
    }

    fn store_path(&self) -> PathBuf {
        self.path().join("partitions.json")
    }

    fn fstab_path(&self) -> PathBuf {
        self.path().join("fstab")
    }

    fn write_store(&self, json: &str) -> Result<()> {
        std::fs::write(self.store_path(), json)?;
        Ok(())
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let settings = self.settings_path();
        let mut full: Vec<&str> = vec!["--no-color", "--settings"];
        let settings = settings.to_string_lossy();
        full.push(&settings);
        full.extend_from_slice(args);
        run_diskwright(&full)
    }
}

fn run_diskwright(args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_diskwright"))
        .args(args)
        .output()?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

#[test]
fn test_parse_nvme_partition() -> Result<()> {
    let output = run_diskwright(&["--no-color", "parse", "/dev/nvme0n1p3"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("/dev/nvme0n1"));
    assert!(output.stdout.contains("nvme"));
    assert!(output.stdout.contains('3'));
    Ok(())
}

#[test]
fn test_parse_json_output() -> Result<()> {
    let output = run_diskwright(&["--json", "parse", "/dev/mmcblk0p1"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    let value: serde_json::Value = serde_json::from_str(&output.stdout)?;
    assert_eq!(value["base_disk"], "/dev/mmcblk0");
    assert_eq!(value["partition_number"], 1);
    assert_eq!(value["disk_type"], "mmc");
    Ok(())
}

#[test]
fn test_parse_rejects_non_device() -> Result<()> {
    let output = run_diskwright(&["--no-color", "parse", "sda1"])?;
    assert_ne!(output.exit_code, 0);
    Ok(())
}

#[test]
fn test_validate_reports_missing_configuration() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = env.run(&["validate"])?;
    assert_ne!(output.exit_code, 0);
    assert!(output.stderr.contains("Missing"), "stderr: {}", output.stderr);
    Ok(())
}

#[test]
fn test_validate_accepts_complete_configuration() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.write_store(
        r#"{
  "/dev/sdz1": { "mountpoint": "/boot", "bootable": true, "fstype": "vfat" },
  "/dev/sdz2": { "mountpoint": "/", "fstype": "ext4" }
}"#,
    )?;
    let output = env.run(&["validate"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("/dev/sdz2"));
    Ok(())
}

#[test]
fn test_fstab_print_orders_root_first() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.write_store(
        r#"{
  "/dev/sdz1": { "mountpoint": "/boot", "bootable": true, "fstype": "vfat" },
  "/dev/sdz2": { "mountpoint": "/", "fstype": "ext4" },
  "/dev/sdz3": { "fstype": "swap" }
}"#,
    )?;
    let output = env.run(&["fstab", "--print"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);

    let entries: Vec<Vec<&str>> = output
        .stdout
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(|line| line.split_whitespace().collect())
        .collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(&entries[0][1..], ["/", "ext4", "defaults", "1", "1"]);
    assert_eq!(&entries[1][1..], ["/boot", "vfat", "defaults", "1", "2"]);
    assert_eq!(&entries[2][1..], ["none", "swap", "defaults", "0", "0"]);
    assert!(!env.fstab_path().exists());
    Ok(())
}

#[test]
fn test_settings_echoes_loaded_file() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = env.run(&["settings"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    assert!(output.stdout.contains(&env.store_path().display().to_string()));
    assert!(output.stdout.contains("timeout_secs = 1"));
    assert!(output.stdout.contains("dry_run = true"));
    Ok(())
}

#[test]
fn test_missing_settings_file_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope.toml");
    let output = run_diskwright(&["--settings", &missing.to_string_lossy(), "settings"])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("nope.toml"), "stderr: {}", output.stderr);
    Ok(())
}

#[test]
fn test_boot_mode_reports_grub_arguments_for_configured_disk() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.write_store(
        r#"{
  "/dev/vdb1": { "mountpoint": "/boot/efi", "bootable": true, "fstype": "vfat" },
  "/dev/vdb2": { "mountpoint": "/", "fstype": "ext4" }
}"#,
    )?;
    let output = env.run(&["--json", "boot-mode"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);

    let value: serde_json::Value = serde_json::from_str(&output.stdout)?;
    let args: Vec<&str> = value["grub_install_args"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    match value["boot_mode"].as_str() {
        Some("uefi") => assert_eq!(
            args,
            ["--target=x86_64-efi", "--efi-directory=/boot/efi", "--bootloader-id=GRUB"]
        ),
        Some("legacy") => assert_eq!(args, ["--target=i386-pc", "/dev/vdb"]),
        other => panic!("unexpected boot mode: {other:?}"),
    }
    Ok(())
}
