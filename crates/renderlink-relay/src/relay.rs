use std::thread;
use std::time::Duration;

use renderlink_net::{connect, TcpEndpoint};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RelayError, Result};
use crate::link::{LinkOutcome, RelayLink};

/// One configured link: where to listen for the control node and which
/// worker to dial once it arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPair {
    pub listen: String,
    pub dest: String,
}

impl RelayPair {
    /// Parse the `LISTEN=DEST` command-line form.
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.split_once('=') {
            Some((listen, dest)) if !listen.trim().is_empty() && !dest.trim().is_empty() => {
                Ok(Self {
                    listen: listen.trim().to_string(),
                    dest: dest.trim().to_string(),
                })
            }
            _ => Err(RelayError::BadPair {
                spec: spec.to_string(),
            }),
        }
    }
}

/// Relay behavior knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long a link may sit with no readiness event before it is
    /// treated as stalled and torn down.
    pub idle_timeout: Duration,
}

impl RelayConfig {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Fans one control connection per pair out to its worker.
///
/// Setup is sequential in list order: each pair's upstream connection
/// is accepted, then its downstream dialed, before the next pair is
/// touched. Only after every link exists does forwarding start, one
/// thread per link. Links share nothing; one link's death never
/// affects another, and the relay returns when all links are done.
pub struct Relay {
    pairs: Vec<RelayPair>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(pairs: Vec<RelayPair>) -> Self {
        Self {
            pairs,
            config: RelayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the relay to completion; one outcome per configured link,
    /// in pair order.
    pub fn run(self) -> Result<Vec<LinkOutcome>> {
        if self.pairs.is_empty() {
            return Err(RelayError::Empty);
        }

        let mut links = Vec::with_capacity(self.pairs.len());
        for (index, pair) in self.pairs.iter().enumerate() {
            let endpoint = TcpEndpoint::bind(&pair.listen)?;
            info!(link = index, listen = %endpoint.local_addr(), dest = %pair.dest, "awaiting upstream");
            let upstream = endpoint.accept()?;
            let downstream = connect(&pair.dest)?;
            info!(link = index, "link established");
            links.push(RelayLink::new(
                index,
                upstream,
                downstream,
                self.config.idle_timeout,
            ));
            // The listener drops here; each pair accepts exactly once.
        }

        info!(links = links.len(), "all links established; forwarding");

        let mut handles = Vec::with_capacity(links.len());
        for link in links {
            let handle = thread::Builder::new()
                .name(format!("relay-link-{}", link.index()))
                .spawn(move || link.run())
                .map_err(RelayError::Spawn)?;
            handles.push(handle);
        }

        let outcomes = handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| LinkOutcome::Failed(std::io::Error::other("link thread panicked")))
            })
            .collect();
        info!("all links terminated");
        Ok(outcomes)
    }
}
