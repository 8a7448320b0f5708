use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Wired,
    #[default]
    Unknown,
}

/// Snapshot of the platform reachability signal. The engine only consumes
/// this; producing it (NWPathMonitor, netlink, ...) belongs to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
    pub is_expensive: bool,
    pub is_constrained: bool,
}

impl ConnectivityStatus {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            connection_type,
            is_expensive: false,
            is_constrained: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::Unknown,
            is_expensive: false,
            is_constrained: false,
        }
    }
}

/// Producer side of the connectivity signal, held by platform glue or tests.
#[derive(Debug)]
pub struct ConnectivityHandle {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ConnectivityHandle {
    pub fn set(&self, status: ConnectivityStatus) {
        // Receivers having gone away is not an error for the producer.
        let _ = self.tx.send(status);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

pub fn connectivity_channel(
    initial: ConnectivityStatus,
) -> (ConnectivityHandle, watch::Receiver<ConnectivityStatus>) {
    let (tx, rx) = watch::channel(initial);
    (ConnectivityHandle { tx }, rx)
}
