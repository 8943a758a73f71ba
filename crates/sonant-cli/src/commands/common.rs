//! Shared CLI helpers.

use sonant_synth::Param;

/// Parse a `key=value` string for clap's `value_parser`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
        None => Err(format!("Invalid parameter format: '{s}' (expected key=value)")),
    }
}

/// Resolves a `name=value` pair to a parameter and its normalized value.
/// The value is in plain units, clamped to the parameter's range.
pub fn resolve_param(name: &str, value: &str) -> anyhow::Result<(Param, f32)> {
    let param = Param::from_string_id(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown parameter '{name}'. Use 'sonant params' to list them."))?;
    let plain: f32 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value '{value}' for parameter '{name}'"))?;
    if !plain.is_finite() {
        anyhow::bail!("Value for parameter '{name}' must be finite");
    }
    Ok((param, param.descriptor().normalize(plain)))
}

/// Formats a plain value with the parameter's precision and unit.
pub fn format_value(param: Param, plain: f32) -> String {
    let descriptor = param.descriptor();
    format!(
        "{:.*}{}",
        usize::from(descriptor.precision),
        plain,
        descriptor.unit.suffix()
    )
}
