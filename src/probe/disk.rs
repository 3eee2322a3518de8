//! Disk free-space probe.

use super::{Probe, ProbeContext, ProbeError, ProbeResult};

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::sync::Arc;

/// Minimum free space for one drive, in megabytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriveThreshold {
    pub drive_name: String,
    pub minimum_free_space: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskStorageOptions {
    #[serde(default)]
    pub drives: Vec<DriveThreshold>,
}

/// A mounted drive and its space available to unprivileged users.
#[derive(Debug, Clone)]
pub struct DriveInfo {
    pub name: String,
    pub available_bytes: u64,
}

/// Source of the live drive list.
pub trait DiskInventory: Send + Sync {
    fn drives(&self) -> io::Result<Vec<DriveInfo>>;
}

/// Drives from the kernel mount table, sized with `statvfs`.
pub struct MountTable;

impl DiskInventory for MountTable {
    fn drives(&self) -> io::Result<Vec<DriveInfo>> {
        let table = std::fs::read_to_string("/proc/mounts")?;
        let mut drives = Vec::new();

        for mount_point in parse_mount_points(&table) {
            match available_bytes(&mount_point) {
                Ok(available_bytes) => drives.push(DriveInfo {
                    name: mount_point,
                    available_bytes,
                }),
                Err(e) => tracing::debug!("Skipping mount {}: {}", mount_point, e),
            }
        }

        Ok(drives)
    }
}

/// Mount points from `/proc/mounts` text, in table order without duplicates.
fn parse_mount_points(table: &str) -> Vec<String> {
    let mut points: Vec<String> = Vec::new();
    for line in table.lines() {
        let Some(raw) = line.split_whitespace().nth(1) else {
            continue;
        };
        // The kernel octal-escapes whitespace in paths.
        let point = raw
            .replace("\\040", " ")
            .replace("\\011", "\t")
            .replace("\\012", "\n")
            .replace("\\134", "\\");
        if !points.contains(&point) {
            points.push(point);
        }
    }
    points
}

fn available_bytes(path: &str) -> io::Result<u64> {
    let c_path = CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat = MaybeUninit::<libc::statvfs>::zeroed();

    // SAFETY: c_path is NUL-terminated and stat points to writable storage
    // of the right type.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: statvfs returned success, so the struct is initialised.
    let stat = unsafe { stat.assume_init() };

    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

/// Mount paths compare equal regardless of a trailing separator.
fn same_drive(a: &str, b: &str) -> bool {
    fn normalize(path: &str) -> &str {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() && path.starts_with('/') {
            "/"
        } else {
            trimmed
        }
    }
    normalize(a) == normalize(b)
}

/// Checks every configured drive and reports all violations together.
pub struct DiskStorageProbe {
    drives: Vec<DriveThreshold>,
    inventory: Arc<dyn DiskInventory>,
}

impl DiskStorageProbe {
    pub fn new(drives: Vec<DriveThreshold>) -> Self {
        Self::with_inventory(drives, Arc::new(MountTable))
    }

    pub fn with_inventory(drives: Vec<DriveThreshold>, inventory: Arc<dyn DiskInventory>) -> Self {
        Self { drives, inventory }
    }
}

#[async_trait]
impl Probe for DiskStorageProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        let inventory = self.inventory.clone();
        let drives = match tokio::task::spawn_blocking(move || inventory.drives()).await {
            Ok(Ok(drives)) => drives,
            Ok(Err(e)) => return ProbeResult::from_error(ctx.failure_status, e.into()),
            Err(e) => {
                return ProbeResult::from_error(
                    ctx.failure_status,
                    ProbeError::Protocol(format!("drive query failed: {}", e)),
                )
            }
        };

        let mut violations = Vec::new();
        for threshold in &self.drives {
            match drives.iter().find(|d| same_drive(&d.name, &threshold.drive_name)) {
                Some(drive) => {
                    let free_mb = drive.available_bytes / 1024 / 1024;
                    if free_mb < threshold.minimum_free_space {
                        violations.push(format!(
                            "free disk space for {} was {} mbytes, minimum free disk space was configured with {} mbytes",
                            threshold.drive_name, free_mb, threshold.minimum_free_space
                        ));
                    }
                }
                None => violations.push(format!("disk {} not found", threshold.drive_name)),
            }
        }

        if violations.is_empty() {
            ProbeResult::healthy()
        } else {
            ProbeResult::new(ctx.failure_status, violations.join("; "))
        }
    }
}
