use std::fmt;
use std::sync::Mutex;
use sysinfo::{Pid, System};

const MIB: u64 = 1024 * 1024;

pub struct ResourceMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub process_memory: Option<u64>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first sample.
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_cpu();
        system.refresh_memory();

        let process_memory = self.pid.and_then(|pid| {
            system.refresh_process(pid);
            system.process(pid).map(|process| process.memory())
        });

        ResourceSnapshot {
            cpu_percent: system.global_cpu_info().cpu_usage(),
            memory_used: system.used_memory(),
            memory_total: system.total_memory(),
            process_memory,
        }
    }

    pub fn log_snapshot(&self) {
        log::info!("System resources: {}", self.snapshot());
    }
}

impl fmt::Display for ResourceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu {:.1}%, memory {} MiB / {} MiB",
            self.cpu_percent,
            self.memory_used / MIB,
            self.memory_total / MIB
        )?;
        if let Some(process_memory) = self.process_memory {
            write!(f, ", process {} MiB", process_memory / MIB)?;
        }
        Ok(())
    }
}
