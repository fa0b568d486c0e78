use super::SupervisorConfig;

/// Validate the supervisor's port policy
///
/// The probed range `[start, start + attempts)` must stay inside `u16`
/// and contain at least one port.
pub fn validate_supervisor(config: &SupervisorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.port_max_attempts == 0 {
        return Err("plugins.port_max_attempts must be greater than zero".into());
    }

    let end = u32::from(config.port_range_start) + u32::from(config.port_max_attempts);
    if end > u32::from(u16::MAX) + 1 {
        return Err(format!(
            "Plugin port range {}-{} exceeds the maximum port 65535",
            config.port_range_start, end
        )
        .into());
    }

    if config.port_range_start == 0 {
        return Err("plugins.port_range_start must be a concrete port, not 0".into());
    }

    Ok(())
}
