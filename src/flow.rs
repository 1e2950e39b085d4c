//! Connection identity.

use std::fmt;
use std::net::IpAddr;

/// The 4-tuple identifying one direction of a TCP connection.
///
/// A connection carrying traffic both ways shows up as two flows with source
/// and destination swapped; each gets its own reassembled stream and its own
/// handler task. The identity is fixed at connection start and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowIdentity {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl fmt::Display for FlowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_four_tuple() {
        let flow = FlowIdentity {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: 43210,
            dst_ip: "93.184.216.34".parse().unwrap(),
            dst_port: 80,
        };
        assert_eq!(flow.to_string(), "10.0.0.1:43210 -> 93.184.216.34:80");
    }
}
