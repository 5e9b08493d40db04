use crate::attribution::ProcessNames;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Looks up process names with `sysinfo`, refreshing only the requested process
#[derive(Debug, Default, Copy, Clone)]
pub struct SysinfoProcesses;

impl SysinfoProcesses {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessNames for SysinfoProcesses {
    fn process_name(&self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}
