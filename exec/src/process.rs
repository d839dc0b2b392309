//! Process-group plumbing for session children.

use std::io;

use tokio::process::{Child, Command};

/// Signals the runtime sends to a session's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillOutcome {
    NotRunning,
    Signalled,
}

/// Put the child in its own session (Unix only) so the whole process group can be
/// signalled with `killpg`, including grandchildren spawned by the shell.
#[cfg(unix)]
pub(crate) fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            // Linux-only: the child dies with us even on SIGKILL of the host.
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn set_new_session(_cmd: &mut Command) {}

/// Deliver `signal` to the child's process group (pid == pgid after `setsid`).
#[cfg(unix)]
pub(crate) fn signal_process_group(child: &mut Child, signal: Signal) -> io::Result<KillOutcome> {
    let Some(pid) = child.id() else {
        return Ok(KillOutcome::NotRunning);
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"));
    };
    unsafe {
        if libc::killpg(pgid, signo) == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(KillOutcome::NotRunning);
            }
            // Fall back to the direct child.
            if signal == Signal::Kill {
                child.start_kill()?;
                return Ok(KillOutcome::Signalled);
            }
            return Err(err);
        }
    }
    Ok(KillOutcome::Signalled)
}

/// Without process groups both signals map to a hard kill of the child.
#[cfg(not(unix))]
pub(crate) fn signal_process_group(child: &mut Child, _signal: Signal) -> io::Result<KillOutcome> {
    if child.id().is_none() {
        return Ok(KillOutcome::NotRunning);
    }
    child.start_kill()?;
    Ok(KillOutcome::Signalled)
}
