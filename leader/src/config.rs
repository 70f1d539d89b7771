use std::time::Duration;

/// Recognized leader configuration, mirroring the options named in
/// spec.md §6. Loaded the way the teacher's `ConsensusConfig` is: plain
/// `serde::Deserialize` over TOML/JSON, with `Default` giving the same
/// defaults ZooKeeper ships.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LeaderConfig {
    /// Ticks allowed for initial sync (handshake through NEWLEADER ack).
    pub init_limit: u32,
    /// Ticks allowed between pings once a learner is serving.
    pub sync_limit: u32,
    /// Base tick duration; `init_limit`/`sync_limit` are multiples of this.
    pub tick_time: Duration,
    /// Whether `reconfig` proposals are accepted at all.
    pub reconfig_enabled: bool,
    /// TCP_NODELAY on learner sockets.
    pub leader_nodelay: bool,
    /// Sample rate for ack-latency logging: emit a timing log every Nth
    /// ack processed (0 disables sampling entirely).
    pub leader_ack_logging_frequency: u32,
    /// Cap, in milliseconds, on how long `getEpochToPropose` may wait
    /// before the voter-disloyalty fast-fail triggers. `None` disables it.
    pub leader_max_time_to_wait_for_epoch: Option<u64>,
    /// QA-only override of the low 32 bits of the seeded zxid.
    pub testingonly_initial_zxid: Option<u32>,
    /// Whether the leader itself also serves client sessions.
    pub leader_serves: bool,
    /// Bind wildcard addresses vs. only the configured quorum addresses.
    pub listen_on_all_ips: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        LeaderConfig {
            init_limit: 10,
            sync_limit: 5,
            tick_time: Duration::from_millis(2000),
            reconfig_enabled: true,
            leader_nodelay: true,
            leader_ack_logging_frequency: 1000,
            leader_max_time_to_wait_for_epoch: None,
            testingonly_initial_zxid: None,
            leader_serves: true,
            listen_on_all_ips: false,
        }
    }
}

impl LeaderConfig {
    pub fn init_limit_duration(&self) -> Duration {
        self.tick_time * self.init_limit
    }

    pub fn sync_limit_duration(&self) -> Duration {
        self.tick_time * self.sync_limit
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_time / 2
    }
}
