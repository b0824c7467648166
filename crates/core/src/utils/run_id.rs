use chrono::Utc;

/// A run id unique across processes: UTC timestamp plus a random suffix.
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let suffix: u32 = rand::random();
    format!("{timestamp}-{suffix:08x}")
}

/// Makes a source name usable as a file name prefix.
pub fn sanitize_prefix(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "batch".to_string()
    } else {
        trimmed.to_string()
    }
}
