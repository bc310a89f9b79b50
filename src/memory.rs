//! Resident-set-size sampling for a child process.
//!
//! On Linux the sampler reads `/proc/<pid>/statm`; elsewhere it returns
//! `None` and the OS address-space cap installed by the spawner is the only
//! memory enforcement.

#[cfg(target_os = "linux")]
pub fn resident_set_size(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    // Second field of statm is the resident page count.
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * page_size())
}

#[cfg(not(target_os = "linux"))]
pub fn resident_set_size(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    use std::sync::OnceLock;
    static PAGE_SIZE: OnceLock<u64> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as u64
        } else {
            4096
        }
    })
}

#[cfg(test)]
mod tests {
    #[cfg(target_os = "linux")]
    #[test]
    fn samples_own_process() {
        let rss = super::resident_set_size(std::process::id()).expect("statm readable");
        assert!(rss > 0, "a live process has resident pages");
    }

    #[test]
    fn missing_pid_yields_none() {
        // PID 0 has no /proc entry visible to us on any platform.
        assert_eq!(super::resident_set_size(0), None);
    }
}
