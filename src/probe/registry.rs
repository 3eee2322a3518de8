//! Maps configured check types to probe constructors.

use super::*;
use crate::config::{CheckSettings, ConfigError};

use std::collections::HashMap;

/// Process-wide handles a probe may need at construction.
#[derive(Clone)]
pub struct ProbeEnvironment {
    pub shutdown: Shutdown,
}

pub type ProbeFactory = fn(&CheckSettings, &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError>;

/// Type tag to factory. Tags are matched case-insensitively.
#[derive(Default)]
pub struct ProbeRegistry {
    factories: HashMap<String, ProbeFactory>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in probe type.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("APPLICATION STATE", build_application_state);
        registry.register("ALLOCATED MEMORY", build_allocated_memory);
        registry.register("DISK STORAGE", build_disk_storage);
        registry.register("SMTP", build_smtp);
        registry.register("DNS", build_dns);
        registry.register("REST", build_rest);
        registry.register("FTP", build_ftp);
        registry.register("SIGNALR", build_signalr);
        registry
    }

    pub fn register(&mut self, tag: &str, factory: ProbeFactory) {
        self.factories.insert(tag.trim().to_uppercase(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(&tag.trim().to_uppercase())
    }

    pub fn build(&self, settings: &CheckSettings, env: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
        let factory = self
            .factories
            .get(&settings.kind.trim().to_uppercase())
            .ok_or_else(|| ConfigError::UnknownProbeType {
                name: settings.name.clone(),
                kind: settings.kind.clone(),
            })?;
        factory(settings, env)
    }
}

fn invalid(settings: &CheckSettings, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidCheck {
        name: settings.name.clone(),
        reason: reason.to_string(),
    }
}

fn build_application_state(_: &CheckSettings, env: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    Ok(Box::new(ApplicationStatusProbe::new(env.shutdown.clone())))
}

fn build_allocated_memory(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: AllocatedMemoryOptions = settings.options()?;
    Ok(Box::new(AllocatedMemoryProbe::new(opts.maximum_memory)))
}

fn build_disk_storage(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: DiskStorageOptions = settings.options()?;
    Ok(Box::new(DiskStorageProbe::new(opts.drives)))
}

fn build_smtp(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: SmtpOptions = settings.options()?;
    if opts.hostname.trim().is_empty() {
        return Err(invalid(settings, "Hostname is required"));
    }
    Ok(Box::new(SmtpProbe::new(&opts)))
}

fn build_dns(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: DnsOptions = settings.options()?;
    Ok(Box::new(DnsProbe::new(opts.hosts)))
}

fn build_rest(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: RestOptions = settings.options()?;
    let probe = RestProbe::new(opts.hosts).map_err(|e| invalid(settings, e))?;
    Ok(Box::new(probe))
}

fn build_ftp(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: FtpOptions = settings.options()?;
    Ok(Box::new(FtpProbe::new(opts.hosts)))
}

fn build_signalr(settings: &CheckSettings, _: &ProbeEnvironment) -> Result<Box<dyn Probe>, ConfigError> {
    let opts: SignalROptions = settings.options()?;
    if opts.url.trim().is_empty() {
        return Err(invalid(settings, "Url is required"));
    }
    let probe = SignalRHubProbe::new(&opts.url).map_err(|e| invalid(settings, e))?;
    Ok(Box::new(probe))
}
