use std::net::IpAddr;

/// Resolve a network interface name (e.g., "eth0") to its first IPv4 address.
/// Returns `None` if the interface doesn't exist or has no IPv4 address.
pub fn resolve_iface_ipv4(iface: &str) -> Option<IpAddr> {
    let path = format!("/sys/class/net/{}/", iface);
    if !std::path::Path::new(&path).exists() {
        return None;
    }

    // Use libc getifaddrs for reliable interface address resolution.
    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return None;
        }

        let mut current = ifaddrs;
        let mut result = None;

        while !current.is_null() {
            let ifa = &*current;
            if !ifa.ifa_addr.is_null() {
                let name = std::ffi::CStr::from_ptr(ifa.ifa_name).to_string_lossy();
                if name == iface && (*ifa.ifa_addr).sa_family == libc::AF_INET as u16 {
                    let addr = &*(ifa.ifa_addr as *const libc::sockaddr_in);
                    let ip =
                        IpAddr::V4(std::net::Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)));
                    result = Some(ip);
                    break;
                }
            }
            current = ifa.ifa_next;
        }

        libc::freeifaddrs(ifaddrs);
        result
    }
}

/// Lists interface names under `/sys/class/net`, the same enumeration
/// point the registry's discovery fallback and the generic collector use.
pub fn list_interfaces() -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return names;
    };
    for entry in entries.flatten() {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_nonexistent_iface_returns_none() {
        assert!(resolve_iface_ipv4("nonexistent_iface0").is_none());
    }

    #[test]
    fn list_interfaces_does_not_panic() {
        // On any Linux host (including CI containers) this returns at
        // least the loopback interface; on non-Linux it degrades to empty.
        let _ = list_interfaces();
    }
}
