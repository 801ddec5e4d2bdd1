//! `.env` loading. Values already present in the process environment are kept.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    /// Given with `--env-file` rather than picked up from the working directory.
    pub explicit: bool,
    pub applied: usize,
}

/// Load the explicit file if given, otherwise `./.env` when it exists.
pub fn load(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };

    let applied = apply(&path)?;
    Ok(Some(LoadedEnvFile { path, explicit, applied }))
}

fn apply(path: &Path) -> Result<usize, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (key, value) in parse(&contents).map_err(|e| format!("{}:{}", path.display(), e))? {
        if std::env::var_os(&key).is_none() {
            // Single-threaded at this point: logging and the poll loop start afterwards.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// Parse `KEY=value` lines. Errors carry the 1-based line number.
pub fn parse(contents: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if let Some(pair) = parse_line(line).map_err(|e| format!("{}: {}", index + 1, e))? {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_value(raw.trim())?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            let unquoted = raw.split_once(" #").map(|(v, _)| v).unwrap_or(raw);
            let unquoted = if unquoted.starts_with('#') { "" } else { unquoted };
            return Ok(unquoted.trim_end().to_string());
        }
    };

    let mut value = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => {
                let escaped = chars.next().ok_or("unterminated escape sequence in double-quoted value")?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => {
                let rest = chars.as_str().trim();
                if rest.is_empty() || rest.starts_with('#') {
                    return Ok(value);
                }
                return Err(format!("unexpected characters after closing {} quote", quote));
            }
            c => value.push(c),
        }
    }
    Err(format!("unterminated {}-quoted value", quote))
}
