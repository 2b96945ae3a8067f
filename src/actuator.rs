//! Fire-and-forget actuator commands over UDP
//!
//! The actuator is a remote node listening for plain-text commands on a
//! fixed datagram endpoint. Delivery is connectionless: one datagram per
//! command, no acknowledgment awaited or checked.

use {std::io, tokio::net::UdpSocket};

#[derive(Debug, Clone)]
pub struct ActuatorDispatcher {
    target: String,
}

impl ActuatorDispatcher {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Send the literal action string as a single datagram.
    ///
    /// The only observable failures are local ones (resolution, socket,
    /// send); a lost datagram is indistinguishable from a delivered one.
    pub async fn send(&self, action: &str) -> io::Result<()> {
        let target = tokio::net::lookup_host(self.target.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("actuator address did not resolve: {}", self.target),
                )
            })?;

        let bind_addr = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(action.as_bytes(), target).await?;

        log::info!("📤 Sent {} to actuator at {}", action, self.target);
        Ok(())
    }
}
