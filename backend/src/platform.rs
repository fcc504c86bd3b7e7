use crate::config::ServerConfig;
use shared::{DEFAULT_MAX_UPLOAD_BYTES, Platform};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("CPU core ids are not available on this host")]
    CoreIdsUnavailable,
    #[error("CPU core {0} does not exist")]
    NoSuchCore(usize),
    #[error("Failed to pin process to CPU core {0}")]
    PinFailed(usize),
}

/// Deployment settings that differ between the Windows, Linux and other builds.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentProfile {
    pub platform: Platform,
    pub force_cpu: bool,
    /// `None` leaves uploads unchecked.
    pub max_upload_bytes: Option<usize>,
    pub cpu_core: Option<usize>,
    pub torch_threads: Option<i32>,
    pub log_resources: bool,
}

impl DeploymentProfile {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self {
                platform,
                force_cpu: true,
                max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
                cpu_core: None,
                torch_threads: None,
                log_resources: false,
            },
            Platform::Linux => Self {
                platform,
                force_cpu: false,
                max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
                cpu_core: Some(0),
                torch_threads: Some(1),
                log_resources: true,
            },
            Platform::Other => Self {
                platform,
                force_cpu: false,
                max_upload_bytes: None,
                cpu_core: None,
                torch_threads: None,
                log_resources: false,
            },
        }
    }

    pub fn resolve(config: &ServerConfig) -> Self {
        let mut profile = Self::for_platform(config.platform());
        let overrides = &config.profile;

        if let Some(force_cpu) = overrides.force_cpu {
            profile.force_cpu = force_cpu;
        }

        let limit = overrides
            .max_upload_bytes
            .or(profile.max_upload_bytes)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        match overrides.enforce_upload_limit {
            Some(true) => profile.max_upload_bytes = Some(limit),
            Some(false) => profile.max_upload_bytes = None,
            None if profile.max_upload_bytes.is_some() => profile.max_upload_bytes = Some(limit),
            None => {}
        }

        match overrides.pin_cpu {
            Some(false) => profile.cpu_core = None,
            Some(true) => profile.cpu_core = Some(overrides.cpu_core.unwrap_or(0)),
            None if profile.cpu_core.is_some() => {
                profile.cpu_core = overrides.cpu_core.or(profile.cpu_core);
            }
            None => {}
        }

        if overrides.torch_threads.is_some() {
            profile.torch_threads = overrides.torch_threads;
        }
        if let Some(log_resources) = overrides.log_resources {
            profile.log_resources = log_resources;
        }

        profile
    }

    /// Pins the calling thread. Threads spawned afterwards (HTTP workers,
    /// the blocking pool) inherit the mask.
    pub fn pin_current_thread(&self) -> Result<Option<usize>, PlatformError> {
        let Some(core) = self.cpu_core else {
            return Ok(None);
        };

        let core_id = core_affinity::get_core_ids()
            .ok_or(PlatformError::CoreIdsUnavailable)?
            .into_iter()
            .find(|id| id.id == core)
            .ok_or(PlatformError::NoSuchCore(core))?;

        if core_affinity::set_for_current(core_id) {
            Ok(Some(core))
        } else {
            Err(PlatformError::PinFailed(core))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileOverrides;

    fn config_for(platform: Platform, profile: ProfileOverrides) -> ServerConfig {
        ServerConfig {
            platform: Some(platform),
            profile,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn windows_forces_cpu_and_checks_size() {
        let profile = DeploymentProfile::for_platform(Platform::Windows);
        assert!(profile.force_cpu);
        assert_eq!(profile.max_upload_bytes, Some(8 * 1024 * 1024));
        assert_eq!(profile.cpu_core, None);
        assert!(!profile.log_resources);
    }

    #[test]
    fn linux_pins_and_logs_resources() {
        let profile = DeploymentProfile::for_platform(Platform::Linux);
        assert!(!profile.force_cpu);
        assert_eq!(profile.cpu_core, Some(0));
        assert_eq!(profile.torch_threads, Some(1));
        assert!(profile.log_resources);
    }

    #[test]
    fn other_platform_leaves_uploads_unchecked() {
        let profile = DeploymentProfile::for_platform(Platform::Other);
        assert_eq!(profile.max_upload_bytes, None);
        assert_eq!(profile.cpu_core, None);
    }

    #[test]
    fn overrides_replace_profile_values() {
        let config = config_for(
            Platform::Linux,
            ProfileOverrides {
                force_cpu: Some(true),
                max_upload_bytes: Some(1024),
                pin_cpu: Some(false),
                log_resources: Some(false),
                ..ProfileOverrides::default()
            },
        );
        let profile = DeploymentProfile::resolve(&config);

        assert!(profile.force_cpu);
        assert_eq!(profile.max_upload_bytes, Some(1024));
        assert_eq!(profile.cpu_core, None);
        assert!(!profile.log_resources);
        assert_eq!(profile.torch_threads, Some(1));
    }

    #[test]
    fn upload_limit_can_be_enabled_on_unchecked_platform() {
        let config = config_for(
            Platform::Other,
            ProfileOverrides {
                enforce_upload_limit: Some(true),
                ..ProfileOverrides::default()
            },
        );
        assert_eq!(
            DeploymentProfile::resolve(&config).max_upload_bytes,
            Some(DEFAULT_MAX_UPLOAD_BYTES)
        );

        let config = config_for(
            Platform::Other,
            ProfileOverrides {
                max_upload_bytes: Some(10),
                ..ProfileOverrides::default()
            },
        );
        assert_eq!(DeploymentProfile::resolve(&config).max_upload_bytes, None);
    }

    #[test]
    fn pinning_is_a_no_op_without_a_core() {
        let profile = DeploymentProfile::for_platform(Platform::Windows);
        assert_eq!(profile.pin_current_thread().unwrap(), None);
    }

    #[test]
    fn pinning_to_a_missing_core_fails() {
        let mut profile = DeploymentProfile::for_platform(Platform::Linux);
        profile.cpu_core = Some(usize::MAX);
        assert!(profile.pin_current_thread().is_err());
    }
}
