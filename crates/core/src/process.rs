use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid as NixPid;
use sysinfo::{Pid, ProcessStatus, System};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub const REAP_GRACE: Duration = Duration::from_millis(250);

pub const KILL_BY_NAME_PROGRAM: &str = "pkill";

pub trait RunningProcess {
    fn id(&self) -> u32;

    fn terminate(&mut self) -> io::Result<()>;

    // Ok(true) once the process has exited and been reaped.
    fn wait_for(&mut self, timeout: Duration) -> io::Result<bool>;
}

impl RunningProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn terminate(&mut self) -> io::Result<()> {
        let pid = NixPid::from_raw(Child::id(self) as i32);
        kill(pid, NixSignal::SIGTERM).map_err(io::Error::from)
    }

    fn wait_for(&mut self, timeout: Duration) -> io::Result<bool> {
        wait_timeout(self, timeout).map(|status| status.is_some())
    }
}

pub fn wait_timeout(
    child: &mut Child,
    timeout: Duration,
) -> io::Result<Option<std::process::ExitStatus>> {
    // A timeout too large for `Instant` means no deadline at all.
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                POLL_INTERVAL.min(deadline - now)
            }
            None => POLL_INTERVAL,
        };
        thread::sleep(pause);
    }
}

pub trait ProcessTable {
    fn is_alive(&self, pid: u32) -> bool;

    fn force_kill(&self, pid: u32) -> bool;

    fn kill_by_name(&self, name: &str, timeout: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return false;
        }
        system
            .process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }

    fn force_kill(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return false;
        }
        system.process(pid).is_some_and(|process| process.kill())
    }

    fn kill_by_name(&self, name: &str, timeout: Duration) {
        let spawned = Command::new(KILL_BY_NAME_PROGRAM)
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                debug!("command `{KILL_BY_NAME_PROGRAM} {name}` failed: {err}");
                return;
            }
        };

        match wait_timeout(&mut child, timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("killing process timeout (name: {name})");
                let _ = child.kill();
                let _ = child.wait();
            }
            Err(err) => debug!("waiting on `{KILL_BY_NAME_PROGRAM} {name}` failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Terminated,
    ForceKilled,
    KilledByName,
}

pub fn escalate_kill<P>(
    process: &mut P,
    name: &str,
    grace: Duration,
    table: &dyn ProcessTable,
) -> Escalation
where
    P: RunningProcess + ?Sized,
{
    let pid = process.id();

    if let Err(err) = process.terminate() {
        debug!("terminate signal failed (pid: {pid}; name: {name}): {err}");
    }
    match process.wait_for(grace) {
        Ok(true) => {}
        Ok(false) => debug!("termination process timeout (pid: {pid}; name: {name})"),
        Err(err) => debug!("waiting after terminate failed (pid: {pid}; name: {name}): {err}"),
    }

    if !table.is_alive(pid) {
        return Escalation::Terminated;
    }

    if !table.force_kill(pid) {
        debug!("force kill not delivered (pid: {pid}; name: {name})");
    }
    // Reap so an exited child is not mistaken for a survivor.
    if let Err(err) = process.wait_for(REAP_GRACE) {
        debug!("waiting after force kill failed (pid: {pid}; name: {name}): {err}");
    }

    if !table.is_alive(pid) {
        return Escalation::ForceKilled;
    }

    debug!("process survived force kill (pid: {pid}; name: {name}); killing by name");
    table.kill_by_name(name, grace);
    Escalation::KilledByName
}
