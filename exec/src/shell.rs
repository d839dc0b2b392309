//! Shell resolution for session commands.

use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::config::ShellConfig;

/// Program and arguments that run one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for ShellInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellFamily {
    PowerShell,
    Cmd,
    Posix,
}

fn family_of(binary: &str) -> ShellFamily {
    // Split on both separators so Windows paths classify the same on every host.
    let file = binary.rsplit(['/', '\\']).next().unwrap_or(binary);
    let name = file.to_lowercase();
    let name = name.strip_suffix(".exe").unwrap_or(&name);
    if name.contains("powershell") || name == "pwsh" {
        ShellFamily::PowerShell
    } else if name == "cmd" {
        ShellFamily::Cmd
    } else {
        ShellFamily::Posix
    }
}

/// Build the invocation for `command`.
///
/// Priority for the shell binary: request, config, platform default.
#[must_use]
pub fn resolve_shell(
    requested: Option<&str>,
    config: &ShellConfig,
    login: Option<bool>,
    command: &str,
) -> ShellInvocation {
    let binary = requested
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| config.binary.clone())
        .unwrap_or_else(default_shell);
    let login = login.or(config.login).unwrap_or(true);

    let (program, mut args) = match family_of(&binary) {
        ShellFamily::PowerShell if cfg!(windows) => (
            PathBuf::from("powershell.exe"),
            vec!["-NoProfile".to_string(), "-Command".to_string()],
        ),
        ShellFamily::PowerShell => (
            PathBuf::from(&binary),
            vec!["-NoProfile".to_string(), "-Command".to_string()],
        ),
        ShellFamily::Cmd => (PathBuf::from(&binary), vec!["/C".to_string()]),
        ShellFamily::Posix => {
            let flag = if login { "-lc" } else { "-c" };
            (PathBuf::from(&binary), vec![flag.to_string()])
        }
    };
    args.push(command.to_string());
    ShellInvocation { program, args }
}

#[cfg(windows)]
fn default_shell() -> String {
    env::var("ComSpec").unwrap_or_else(|_| r"C:\Windows\System32\cmd.exe".to_string())
}

#[cfg(not(windows))]
fn default_shell() -> String {
    if let Ok(shell) = env::var("SHELL")
        && !shell.trim().is_empty()
    {
        return shell;
    }
    if PathBuf::from("/bin/bash").exists() {
        return "/bin/bash".to_string();
    }
    which::which("bash")
        .or_else(|_| which::which("sh"))
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::{ShellConfig, ShellFamily, family_of, resolve_shell};

    #[test]
    fn family_detection() {
        assert_eq!(family_of("/usr/bin/bash"), ShellFamily::Posix);
        assert_eq!(family_of("zsh"), ShellFamily::Posix);
        assert_eq!(family_of("pwsh"), ShellFamily::PowerShell);
        assert_eq!(family_of("powershell.exe"), ShellFamily::PowerShell);
        assert_eq!(family_of("C:\\Windows\\System32\\cmd.exe"), ShellFamily::Cmd);
    }

    #[test]
    fn posix_login_flag() {
        let cfg = ShellConfig::default();
        let inv = resolve_shell(Some("/bin/sh"), &cfg, None, "echo hi");
        assert_eq!(inv.program.to_str(), Some("/bin/sh"));
        assert_eq!(inv.args, vec!["-lc", "echo hi"]);

        let inv = resolve_shell(Some("/bin/sh"), &cfg, Some(false), "echo hi");
        assert_eq!(inv.args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn config_supplies_binary_and_login() {
        let cfg = ShellConfig {
            binary: Some("/bin/zsh".into()),
            login: Some(false),
        };
        let inv = resolve_shell(None, &cfg, None, "pwd");
        assert_eq!(inv.program.to_str(), Some("/bin/zsh"));
        assert_eq!(inv.args, vec!["-c", "pwd"]);
    }

    #[test]
    fn powershell_uses_no_profile_command() {
        let inv = resolve_shell(Some("pwsh"), &ShellConfig::default(), None, "Get-Date");
        assert_eq!(inv.args, vec!["-NoProfile", "-Command", "Get-Date"]);
    }

    #[cfg(windows)]
    #[test]
    fn windows_powershell_runs_powershell_exe() {
        let inv = resolve_shell(Some("powershell"), &ShellConfig::default(), None, "dir");
        assert_eq!(inv.program.to_str(), Some("powershell.exe"));
    }
}
