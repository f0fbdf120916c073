//! Modbus TCP poller for the Sungrow inverter via the WiNet-S dongle.
//!
//! Executes one poll cycle at a time: connect, read every register group in
//! map order with an inter-group delay, slice the group responses into
//! per-register word vectors. Any transport error, timeout, or Modbus
//! exception fails the whole cycle; no partial result is returned. The one
//! exception is the optional export group, which some inverter firmwares do
//! not expose.
//!
//! Consecutive failures open an exponential backoff window (1 s doubling
//! up to 60 s). While the window is open [`Poller::poll`] returns
//! immediately without attempting I/O, so the poll loop is never blocked
//! beyond request timeouts plus inter-group delays.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::lookup_host;
use tokio::time::{sleep, timeout, Instant};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::config::EdgeConfig;
use crate::registers::{RegisterGroup, ALL_GROUPS, OPTIONAL_GROUP};

/// Timeout per Modbus TCP request (WiNet-S guideline).
pub const MODBUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial backoff delay after the first connection failure.
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Cap for exponential backoff growth.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Raw poll result: register name to its 16-bit words (1 word for
/// U16/S16, 2 words high-first for U32/S32).
pub type RawRegisters = HashMap<String, Vec<u16>>;

/// Errors failing a poll cycle.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("modbus request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error reading group '{group}': {reason}")]
    Transport { group: &'static str, reason: String },
    #[error("modbus exception reading group '{group}': {exception}")]
    Exception {
        group: &'static str,
        exception: String,
    },
}

/// Stateful Modbus TCP poller with exponential backoff.
pub struct Poller {
    host: String,
    port: u16,
    slave_id: u8,
    inter_register_delay: Duration,
    backoff: Duration,
    not_before: Option<Instant>,
}

impl Poller {
    pub fn new(config: &EdgeConfig) -> Self {
        Self {
            host: config.sungrow_host.clone(),
            port: config.sungrow_port,
            slave_id: config.sungrow_slave_id,
            inter_register_delay: config.inter_register_delay,
            backoff: BASE_BACKOFF,
            not_before: None,
        }
    }

    /// Current backoff delay that will be applied after the next failure.
    pub fn current_backoff(&self) -> Duration {
        self.backoff
    }

    /// Executes a single poll cycle.
    ///
    /// Returns `Ok(None)` without attempting I/O while the backoff window
    /// from previous failures is still open. A successful cycle resets the
    /// backoff to its base value.
    pub async fn poll(&mut self) -> Result<Option<RawRegisters>, PollError> {
        if let Some(not_before) = self.not_before {
            let now = Instant::now();
            if now < not_before {
                tracing::debug!(
                    retry_in_ms = (not_before - now).as_millis() as u64,
                    "backoff window open, skipping poll attempt"
                );
                return Ok(None);
            }
        }

        match self.do_poll().await {
            Ok(raw) => {
                self.backoff = BASE_BACKOFF;
                self.not_before = None;
                Ok(Some(raw))
            }
            Err(err) => {
                self.not_before = Some(Instant::now() + self.backoff);
                tracing::warn!(
                    backoff_s = self.backoff.as_secs(),
                    error = %err,
                    "poll cycle failed, backing off"
                );
                self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                Err(err)
            }
        }
    }

    async fn do_poll(&self) -> Result<RawRegisters, PollError> {
        let mut ctx = self.connect().await?;

        let mut raw = RawRegisters::new();
        for (idx, group) in ALL_GROUPS.iter().enumerate() {
            // Inter-register delay between groups, not before the first read.
            if idx > 0 && !self.inter_register_delay.is_zero() {
                sleep(self.inter_register_delay).await;
            }

            let response = timeout(
                MODBUS_TIMEOUT,
                ctx.read_input_registers(group.start_address, group.count),
            )
            .await;

            let words = match response {
                Err(_) => return Err(PollError::Timeout(MODBUS_TIMEOUT)),
                Ok(Err(err)) => {
                    return Err(PollError::Transport {
                        group: group.name,
                        reason: err.to_string(),
                    })
                }
                Ok(Ok(Err(exception))) => {
                    if group.name == OPTIONAL_GROUP {
                        tracing::warn!(
                            group = group.name,
                            start_address = group.start_address,
                            count = group.count,
                            exception = ?exception,
                            "modbus error reading optional group, continuing without it"
                        );
                        continue;
                    }
                    return Err(PollError::Exception {
                        group: group.name,
                        exception: format!("{exception:?}"),
                    });
                }
                Ok(Ok(Ok(words))) => words,
            };

            slice_group(group, &words, &mut raw);
        }

        Ok(raw)
    }

    /// Reads an arbitrary input register range once. Diagnostic helper for
    /// the `scan` subcommand.
    pub async fn read_range(&self, start: u16, count: u16) -> Result<Vec<u16>, PollError> {
        let mut ctx = self.connect().await?;
        let response = timeout(MODBUS_TIMEOUT, ctx.read_input_registers(start, count)).await;
        match response {
            Err(_) => Err(PollError::Timeout(MODBUS_TIMEOUT)),
            Ok(Err(err)) => Err(PollError::Transport {
                group: "scan",
                reason: err.to_string(),
            }),
            Ok(Ok(Err(exception))) => Err(PollError::Exception {
                group: "scan",
                exception: format!("{exception:?}"),
            }),
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }

    async fn connect(&self) -> Result<Context, PollError> {
        let addr = self.resolve().await?;
        match timeout(MODBUS_TIMEOUT, tcp::connect_slave(addr, Slave(self.slave_id))).await {
            Err(_) => Err(PollError::Timeout(MODBUS_TIMEOUT)),
            Ok(Err(err)) => Err(PollError::Connect {
                host: self.host.clone(),
                port: self.port,
                reason: err.to_string(),
            }),
            Ok(Ok(ctx)) => Ok(ctx),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, PollError> {
        lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|err| PollError::Resolve {
                host: self.host.clone(),
                port: self.port,
                reason: err.to_string(),
            })?
            .next()
            .ok_or_else(|| PollError::Resolve {
                host: self.host.clone(),
                port: self.port,
                reason: "no addresses returned".to_string(),
            })
    }
}

/// Slices a group read response into per-register word vectors keyed by
/// register name. Each register's words start at its address offset within
/// the group.
fn slice_group(group: &RegisterGroup, words: &[u16], out: &mut RawRegisters) {
    for reg in group.registers {
        let offset = (reg.address - group.start_address) as usize;
        let end = offset + reg.kind.word_count() as usize;
        if let Some(slice) = words.get(offset..end) {
            out.insert(reg.name.to_string(), slice.to_vec());
        } else {
            tracing::warn!(
                register = reg.name,
                expected = reg.kind.word_count(),
                got = words.len(),
                "group response too short for register"
            );
        }
    }
}
