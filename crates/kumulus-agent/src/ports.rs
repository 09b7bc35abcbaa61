//! Host port allocation.

use std::net::{Ipv4Addr, TcpListener};

use crate::config::PortRange;
use crate::error::{AgentError, AgentResult};

/// Answers whether a host port can currently be bound.
pub trait PortProbe: Send + Sync {
    /// Whether `port` is free on this host.
    fn is_free(&self, port: u16) -> bool;
}

/// Probes ports by briefly binding them on all interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPortProbe;

impl PortProbe for LocalPortProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

/// First free port in `range`, scanning upwards.
///
/// The port is released again before returning, so a concurrent allocation
/// can race for it; `docker run` then fails and the caller reports the error.
pub fn allocate(probe: &dyn PortProbe, range: PortRange) -> AgentResult<u16> {
    range
        .ports()
        .find(|port| probe.is_free(*port))
        .ok_or(AgentError::PortsExhausted {
            start: range.start,
            end: range.end,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Taken(Vec<u16>);

    impl PortProbe for Taken {
        fn is_free(&self, port: u16) -> bool {
            !self.0.contains(&port)
        }
    }

    #[test]
    fn picks_lowest_free_port() {
        let probe = Taken(vec![2222, 2223]);
        assert_eq!(allocate(&probe, PortRange::new(2222, 2322)).unwrap(), 2224);
    }

    #[test]
    fn exhausted_range() {
        let probe = Taken(vec![10, 11]);
        let err = allocate(&probe, PortRange::new(10, 11)).unwrap_err();
        assert!(matches!(err, AgentError::PortsExhausted { start: 10, end: 11 }));
    }

    #[test]
    fn local_probe_sees_bound_port() {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!LocalPortProbe.is_free(port));
    }
}
