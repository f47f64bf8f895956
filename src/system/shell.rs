// src/system/shell.rs

//! Platform command lines for launching and logging.

use crate::models::Platform;

/// Characters that force an argument into double quotes on a cmd.exe command line.
const CMD_SPECIAL_CHARS: &[char] = &['*', '?', ',', ';', '^', '&', '<', '>', '|', '"'];

/// Translates an argument vector into a single `cmd.exe` command line.
///
/// Batch files do not report their exit code reliably, so the command is wrapped as
/// `cmd.exe /C "<command line> && exit %%ERRORLEVEL%%"`. The doubled percent signs
/// delay the expansion of `ERRORLEVEL` until the batch file has finished.
pub fn to_windows_command(args: &[String]) -> Vec<String> {
    let command_line = args
        .iter()
        .map(|arg| quote_for_cmd(arg))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        "cmd.exe".to_string(),
        "/C".to_string(),
        format!("\"{} && exit %%ERRORLEVEL%%\"", command_line),
    ]
}

/// Quotes a single argument for cmd.exe when it contains whitespace or
/// metacharacters. Embedded double quotes are doubled.
fn quote_for_cmd(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || CMD_SPECIAL_CHARS.contains(&c));
    if needs_quotes {
        format!("\"{}\"", arg.replace('"', "\"\""))
    } else {
        arg.to_string()
    }
}

/// Renders an argument vector for display in build output.
pub fn display_command(args: &[String], platform: Platform) -> String {
    match platform {
        Platform::Unix => shlex::try_join(args.iter().map(String::as_str))
            .unwrap_or_else(|_| args.join(" ")),
        Platform::Windows => args.join(" "),
    }
}
