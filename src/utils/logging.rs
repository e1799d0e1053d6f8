use serde::Serialize;

/// Logs `value` as pretty JSON at DEBUG; serialization is skipped when DEBUG is off.
///
/// Never pass values carrying secrets (server bindings, credential records).
pub(crate) fn debug_pretty_json<T>(what: &str, value: &T)
where
    T: Serialize,
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let pretty_json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>"));
    tracing::debug!("{what}:\n{pretty_json}");
}
