// ── SshFs – volume information ───────────────────────────────────────────────

use crate::sshfs::error::FsResult;
use crate::sshfs::service::SshFs;
use crate::sshfs::types::{DiskSpace, VolumeInfo};
use log::debug;

pub const FILE_SYSTEM_NAME: &str = "SSHFS";
pub const MAX_COMPONENT_LENGTH: u32 = 255;

impl SshFs {
    /// SFTP offers no portable free-space query, so the configured figures
    /// are reported.
    pub fn get_disk_free_space(&self) -> FsResult<DiskSpace> {
        debug!("GetDiskFreeSpace");
        let free = self.config.disk_free_bytes.min(self.config.disk_total_bytes);
        Ok(DiskSpace {
            free_bytes_available: free,
            total_bytes: self.config.disk_total_bytes,
            total_free_bytes: free,
        })
    }

    pub fn get_volume_information(&self) -> FsResult<VolumeInfo> {
        debug!("GetVolumeInformation");
        let volume_label = self
            .config
            .volume_label
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.config.username, self.config.host));
        Ok(VolumeInfo {
            volume_label,
            file_system_name: FILE_SYSTEM_NAME.to_string(),
            case_sensitive_search: true,
            case_preserved_names: true,
            unicode_on_disk: true,
            max_component_length: MAX_COMPONENT_LENGTH,
        })
    }
}
