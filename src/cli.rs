//! Command line: `[--env-file <path>] [control <unique_id> <action> [code]]`.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::services::control::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Poll,
    Control {
        unique_id: String,
        action: Action,
        code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub env_file: Option<PathBuf>,
    pub command: Command,
}

/// Parse arguments without the program name.
pub fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut env_file: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let path = if arg == "--env-file" {
            let value = args
                .next()
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
            Some(PathBuf::from(value))
        } else if let Some(value) = arg.strip_prefix("--env-file=") {
            if value.is_empty() {
                return Err("`--env-file` requires a path argument".to_string());
            }
            Some(PathBuf::from(value))
        } else if arg == "--" {
            positional.extend(args.by_ref().filter_map(|a| a.into_string().ok()));
            None
        } else if arg.starts_with("--") {
            return Err(format!("unrecognised argument: {}", arg));
        } else {
            positional.push(arg);
            None
        };

        if let Some(path) = path {
            if env_file.replace(path).is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
        }
    }

    Ok(CliArgs {
        env_file,
        command: parse_command(positional)?,
    })
}

fn parse_command(positional: Vec<String>) -> Result<Command, String> {
    let mut words = positional.into_iter();
    match words.next().as_deref() {
        None => Ok(Command::Poll),
        Some("control") => {
            let unique_id = words
                .next()
                .ok_or_else(|| "usage: control <unique_id> <arm_away|arm_home|disarm|on|off> [code]".to_string())?;
            let action = words
                .next()
                .ok_or_else(|| format!("missing action for '{}'", unique_id))?
                .parse::<Action>()?;
            let code = words.next();
            if let Some(extra) = words.next() {
                return Err(format!("unexpected argument: {}", extra));
            }
            Ok(Command::Control { unique_id, action, code })
        }
        Some(other) => Err(format!("unknown command: {}", other)),
    }
}
