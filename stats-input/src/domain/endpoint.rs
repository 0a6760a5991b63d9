//! UDP endpoint value object.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A UDP destination a container sends its telemetry to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UdpEndpoint {
    pub host: String,
    pub port: u16,
}

impl UdpEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for UdpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_endpoint_equality_needs_both_fields() {
        let a = UdpEndpoint::new("host1", 1);
        assert_eq!(a, UdpEndpoint::new("host1", 1));
        assert_ne!(a, UdpEndpoint::new("host1", 2));
        assert_ne!(a, UdpEndpoint::new("host2", 1));

        let set: HashSet<_> = [a.clone(), a.clone(), UdpEndpoint::new("host1", 2)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(UdpEndpoint::new("127.0.0.1", 8125).to_string(), "127.0.0.1:8125");
    }
}
