// Serial device discovery

use tracing::{debug, info};

use super::session::SessionError;

/// Pick the first device (in sorted order) whose path starts with `prefix`
pub fn select_port<I, S>(names: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut matches: Vec<String> = names
        .into_iter()
        .map(Into::into)
        .filter(|name| name.starts_with(prefix))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Find a connected serial device matching `prefix`
pub fn find_port(prefix: &str) -> Result<String, SessionError> {
    let ports = serialport::available_ports().map_err(|e| SessionError::LinkUnavailable {
        path: format!("{}*", prefix),
        reason: e.to_string(),
    })?;
    debug!(
        "Available serial ports: {:?}",
        ports.iter().map(|p| p.port_name.as_str()).collect::<Vec<_>>()
    );

    let port = select_port(ports.into_iter().map(|p| p.port_name), prefix).ok_or_else(|| {
        SessionError::LinkUnavailable {
            path: format!("{}*", prefix),
            reason: "no serial device detected".to_string(),
        }
    })?;
    info!("Using serial device {}", port);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_lowest_match() {
        let names = ["/dev/ttyS0", "/dev/ttyUSB1", "/dev/ttyUSB0", "/dev/ttyACM0"];
        assert_eq!(
            select_port(names, "/dev/ttyUSB"),
            Some("/dev/ttyUSB0".to_string())
        );
    }

    #[test]
    fn test_find_port_without_device_is_unavailable() {
        let result = find_port("/dev/nonexistent-ugv-prefix");
        assert!(matches!(result, Err(SessionError::LinkUnavailable { .. })));
    }

    #[test]
    fn test_no_match() {
        let names = ["/dev/ttyS0", "/dev/ttyACM0"];
        assert_eq!(select_port(names, "/dev/ttyUSB"), None);
    }
}
