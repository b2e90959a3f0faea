use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;

pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(1);
const FORCE_WAIT: Duration = Duration::from_secs(2);

/// Build the platform shell invocation for `command`, running in `cwd`.
///
/// On unix the child leads its own process group so the whole tree can be
/// signalled at once.
pub fn shell_command(command: &str, cwd: &Path) -> std::process::Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C").arg(format!("chcp 65001 >nul & {command}"));
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd.current_dir(cwd).stdin(Stdio::null());
    cmd
}

/// Terminate `child` and every process in its group `group`.
///
/// Asks nicely first, waits up to `grace`, then force-kills whatever is left.
/// The group is signalled even when the leader has already been reaped.
pub async fn terminate_tree(child: &mut Child, group: u32, grace: Duration) -> io::Result<()> {
    // Group 0 would address our own process group.
    if group == 0 {
        let _ = child.start_kill();
        let _ = timeout(grace, child.wait()).await;
        return Ok(());
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(group as i32);
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => return Err(io::Error::from(errno)),
        }

        let exited = timeout(grace, child.wait()).await.is_ok();
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => tracing::warn!(group, error = %errno, "SIGKILL to process group failed"),
        }
        if !exited {
            let _ = child.start_kill();
            let _ = timeout(FORCE_WAIT, child.wait()).await;
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        let status = tokio::process::Command::new("taskkill")
            .args(["/PID", &group.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if !matches!(status, Ok(s) if s.success()) {
            tracing::debug!(group, "taskkill did not succeed, killing child directly");
        }
        if timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }
        match child.start_kill() {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err),
        }
        let _ = timeout(FORCE_WAIT, child.wait()).await;
        Ok(())
    }
}

/// Synchronous last-resort kill of a process group, used where awaiting is
/// impossible (drop).
pub fn force_kill_tree(group: u32) {
    if group == 0 {
        return;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(group as i32), Signal::SIGKILL);
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &group.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminate_tree_stops_sleeping_child() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("sleep 30", dir.path());
        let mut child = tokio::process::Command::from(cmd)
            .spawn()
            .expect("spawn sleep");
        let group = child.id().expect("pid");

        terminate_tree(&mut child, group, Duration::from_millis(500))
            .await
            .expect("terminate");
        let status = child.try_wait().expect("try_wait");
        assert!(status.is_some(), "child should have exited");
    }

    #[tokio::test]
    async fn test_terminate_tree_on_exited_child_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("true", dir.path());
        let mut child = tokio::process::Command::from(cmd).spawn().expect("spawn");
        let group = child.id().expect("pid");
        child.wait().await.expect("wait");
        assert!(terminate_tree(&mut child, group, DEFAULT_KILL_GRACE).await.is_ok());
    }

    #[tokio::test]
    async fn test_terminate_tree_after_leader_reaped_kills_group() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("sleep 30 & echo $! > orphan.pid", dir.path());
        let mut child = tokio::process::Command::from(cmd).spawn().expect("spawn");
        let group = child.id().expect("pid");
        child.wait().await.expect("leader exits");
        assert!(child.id().is_none());

        let orphan: i32 = std::fs::read_to_string(dir.path().join("orphan.pid"))
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        terminate_tree(&mut child, group, Duration::from_millis(200))
            .await
            .expect("terminate");

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let alive = match std::fs::read_to_string(format!("/proc/{orphan}/stat")) {
                Ok(stat) => !stat
                    .rsplit_once(')')
                    .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
                Err(_) => false,
            };
            if !alive {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "orphan {orphan} survived");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
