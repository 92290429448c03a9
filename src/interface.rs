//! The interface-information provider: link-layer address, MTU, link speed
//! and configured IP addresses of an OS network interface. The engine polls
//! this at init until the link is up and addresses are present.

use std::ffi::CStr;
use std::fs;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ptr;

use libc;
use pnet::util::MacAddr;

use addr::IfAddr;

/// Everything the engine needs to know about the interface it runs on.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: MacAddr,
    pub mtu: u16,
    /// Link speed in Mb/s; zero when unknown.
    pub mbps: u32,
    pub is_up: bool,
    pub is_loopback: bool,
    pub addrs: Vec<IfAddr>,
}

impl InterfaceInfo {
    /// A bare description with no addresses; useful for assembling test and
    /// bypass-driver configurations by hand.
    pub fn new(name: &str, mac: MacAddr, mtu: u16) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_owned(),
            mac: mac,
            mtu: mtu,
            mbps: 0,
            is_up: true,
            is_loopback: false,
            addrs: Vec::new(),
        }
    }
}

fn contig_prefix_len(mask: &[u8]) -> u8 {
    let mut len = 0u8;
    for b in mask {
        if *b == 0xff {
            len += 8;
        } else {
            let mut val = *b;
            while val != 0 {
                len += 1;
                val <<= 1;
            }
            break;
        }
    }
    len
}

/// Query the OS for the state of interface `name` via `getifaddrs(3)`.
/// Returns `None` when the interface does not exist.
pub fn lookup(name: &str) -> io::Result<Option<InterfaceInfo>> {
    let mut info: Option<InterfaceInfo> = None;

    unsafe {
        let mut addrs: *mut libc::ifaddrs = ptr::null_mut();
        if libc::getifaddrs(&mut addrs) != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut cur = addrs;
        while !cur.is_null() {
            let ifa = &*cur;
            cur = ifa.ifa_next;
            if ifa.ifa_name.is_null() {
                continue;
            }
            let ifa_name = CStr::from_ptr(ifa.ifa_name).to_string_lossy();
            if ifa_name != name {
                continue;
            }

            let info = info.get_or_insert_with(|| {
                let mut i = InterfaceInfo::new(name, MacAddr::zero(), 1500);
                i.is_up = ifa.ifa_flags & libc::IFF_UP as u32 != 0;
                i.is_loopback = ifa.ifa_flags & libc::IFF_LOOPBACK as u32 != 0;
                i.mtu = mtu_of(name).unwrap_or(1500);
                i.mbps = speed_of(name);
                i
            });

            if ifa.ifa_addr.is_null() {
                continue;
            }
            match (*ifa.ifa_addr).sa_family as i32 {
                libc::AF_INET => {
                    let sin = &*(ifa.ifa_addr as *const libc::sockaddr_in);
                    let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                    let prefix = if ifa.ifa_netmask.is_null() {
                        32
                    } else {
                        let m = &*(ifa.ifa_netmask as *const libc::sockaddr_in);
                        contig_prefix_len(&m.sin_addr.s_addr.to_ne_bytes())
                    };
                    info.addrs.push(IfAddr::v4(ip, prefix));
                }
                libc::AF_INET6 => {
                    let sin6 = &*(ifa.ifa_addr as *const libc::sockaddr_in6);
                    let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                    let prefix = if ifa.ifa_netmask.is_null() {
                        128
                    } else {
                        let m = &*(ifa.ifa_netmask as *const libc::sockaddr_in6);
                        contig_prefix_len(&m.sin6_addr.s6_addr)
                    };
                    info.addrs.push(IfAddr::v6(ip, prefix, sin6.sin6_scope_id));
                }
                #[cfg(target_os = "linux")]
                libc::AF_PACKET => {
                    let sll = &*(ifa.ifa_addr as *const libc::sockaddr_ll);
                    if sll.sll_halen == 6 {
                        let a = sll.sll_addr;
                        info.mac = MacAddr::new(a[0], a[1], a[2], a[3], a[4], a[5]);
                    }
                }
                _ => {}
            }
        }
        libc::freeifaddrs(addrs);
    }

    Ok(info)
}

/// Read the interface MTU via `SIOCGIFMTU`.
fn mtu_of(name: &str) -> Option<u16> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if fd < 0 {
            return None;
        }
        let mut req: libc::ifreq = ::std::mem::zeroed();
        for (dst, src) in req.ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        let ret = libc::ioctl(fd, libc::SIOCGIFMTU as _, &mut req);
        libc::close(fd);
        if ret == 0 {
            // loopback interfaces report MTUs beyond the 16-bit range
            Some(::std::cmp::min(req.ifr_ifru.ifru_mtu, 65535) as u16)
        } else {
            None
        }
    }
}

/// Link speed in Mb/s, from sysfs where available.
fn speed_of(name: &str) -> u32 {
    match fs::read_to_string(format!("/sys/class/net/{}/speed", name)) {
        Ok(s) => s.trim().parse().unwrap_or(0),
        Err(..) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{contig_prefix_len, lookup};

    #[test]
    fn prefix_lengths() {
        assert_eq!(contig_prefix_len(&[255, 255, 255, 0]), 24);
        assert_eq!(contig_prefix_len(&[255, 0, 0, 0]), 8);
        assert_eq!(contig_prefix_len(&[255, 255, 192, 0]), 18);
        assert_eq!(contig_prefix_len(&[0, 0, 0, 0]), 0);
    }

    #[test]
    fn loopback_exists() {
        let info = lookup("lo").unwrap();
        if let Some(info) = info {
            assert!(info.is_loopback);
            assert!(!info.addrs.is_empty());
        }
    }
}
