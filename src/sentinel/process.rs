//! Process table lister
//!
//! Finds capture tools by scanning `ps` output.

use super::CaptureProcessLister;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::process::Command;

/// Lists capture processes from the system process table.
///
/// This process and its direct children are excluded, so captures run by
/// our own supervisor are not reported as external.
#[derive(Debug, Clone)]
pub struct ProcessTableLister {
    names: Vec<String>,
    own_pid: u32,
}

impl ProcessTableLister {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            own_pid: std::process::id(),
        }
    }
}

impl CaptureProcessLister for ProcessTableLister {
    fn list_active_capture_processes(&self) -> io::Result<BTreeSet<u32>> {
        let output = Command::new("ps")
            .args(["-eo", "pid=,ppid=,comm="])
            .output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("ps exited with {}", output.status),
            ));
        }
        let table = String::from_utf8_lossy(&output.stdout);
        Ok(parse_process_table(&table, &self.names, self.own_pid))
    }
}

/// Pick capture processes out of `pid ppid comm` lines
fn parse_process_table(table: &str, names: &[String], own_pid: u32) -> BTreeSet<u32> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid: u32 = fields.next()?.parse().ok()?;
            let ppid: u32 = fields.next()?.parse().ok()?;
            let comm = fields.collect::<Vec<_>>().join(" ");
            Some((pid, ppid, comm))
        })
        .filter(|(pid, ppid, _)| *pid != own_pid && *ppid != own_pid)
        .filter(|(_, _, comm)| {
            // Some platforms report the full executable path
            let name = Path::new(comm)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| comm.clone());
            names.iter().any(|wanted| *wanted == name)
        })
        .map(|(pid, _, _)| pid)
        .collect()
}
