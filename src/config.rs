use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for the coordinator process.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the HTTP service listens on.
    pub listen_addr: SocketAddr,
    /// Address workers and jobs use to reach this coordinator
    /// (host:port; usually `listen_addr` unless behind NAT).
    pub advertise_addr: String,
    /// Address of the key-value store coordinator (host:port).
    pub kvs_addr: String,
    /// Directory where submitted code packages are persisted.
    pub package_dir: PathBuf,
    /// A worker that has not pinged within this window is considered dead.
    pub worker_ttl_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        // SAFETY: hardcoded valid address that will always parse
        let listen_addr: SocketAddr = "127.0.0.1:9000"
            .parse()
            .expect("default listen address is valid");
        Self {
            listen_addr,
            advertise_addr: listen_addr.to_string(),
            kvs_addr: "127.0.0.1:8000".to_string(),
            package_dir: PathBuf::from("."),
            worker_ttl_ms: 15_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr, kvs_addr: String) -> Self {
        Self {
            listen_addr,
            advertise_addr: listen_addr.to_string(),
            kvs_addr,
            ..Default::default()
        }
    }

    pub fn with_package_dir(mut self, dir: PathBuf) -> Self {
        self.package_dir = dir;
        self
    }

    pub fn with_worker_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.worker_ttl_ms = ttl_ms;
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the HTTP service listens on.
    pub listen_addr: SocketAddr,
    /// Port advertised to the coordinator in heartbeats. Usually the
    /// listen port; differs when the worker is bound to port 0.
    pub advertise_port: u16,
    /// Address of the coordinator (host:port).
    pub coordinator_addr: String,
    /// Directory holding the worker's persisted identity and the
    /// most recently pushed code package.
    pub storage_dir: PathBuf,
    /// Interval between heartbeats to the coordinator.
    pub heartbeat_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        // SAFETY: hardcoded valid address that will always parse
        let listen_addr: SocketAddr = "127.0.0.1:9001"
            .parse()
            .expect("default listen address is valid");
        Self {
            listen_addr,
            advertise_port: listen_addr.port(),
            coordinator_addr: "127.0.0.1:9000".to_string(),
            storage_dir: PathBuf::from("."),
            heartbeat_interval_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    pub fn new(listen_addr: SocketAddr, coordinator_addr: String) -> Self {
        Self {
            listen_addr,
            advertise_port: listen_addr.port(),
            coordinator_addr,
            ..Default::default()
        }
    }

    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = dir;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_advertise_port(mut self, port: u16) -> Self {
        self.advertise_port = port;
        self
    }
}
