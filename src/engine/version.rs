use crate::error::EngineError;

/// Parse the version string reported by `SHOW server_version`.
///
/// The string is not always just a number: it may be `9.6.18`, or carry
/// build details such as `12.4 (Ubuntu 12.4-0ubuntu0.20.04.1)`. Only the
/// major and minor numbers are kept. A missing minor number reads as `0`.
///
/// # Errors
/// Returns `EngineError::VersionParse` if the major or minor part is not numeric.
pub fn parse_raw_version_string(version_string: &str) -> Result<f64, EngineError> {
    let segment = version_string.trim().split(' ').next().unwrap_or_default();
    let mut parts = segment.split('.');

    let major = parts.next().unwrap_or_default();
    let minor = parts.next().unwrap_or("0");
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(major) || !is_number(minor) {
        return Err(EngineError::VersionParse(version_string.to_string()));
    }

    format!("{major}.{minor}")
        .parse()
        .map_err(|_| EngineError::VersionParse(version_string.to_string()))
}
