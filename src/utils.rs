use std::path::Path;

use serde::de::DeserializeOwned;

/// Finds the first brace-delimited JSON value in `text` that decodes as `T`,
/// skipping whatever log lines surround it.
pub fn first_json_payload<T: DeserializeOwned>(text: &str) -> Option<T> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<T>()
            .next()
            .and_then(Result::ok)
    })
}

/// Forward-slash form of a path, as ffmpeg's concat demuxer and filters expect.
pub fn posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Last few lines of a process stream, for error messages.
pub fn tail_lines(bytes: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
