//! Run progress feed over a local socket.
//!
//! The controller publishes one JSON line per [`ProgressEvent`]. An operator
//! console binds a [`ProgressMonitor`] and reads them. The feed is advisory:
//! a broken connection is logged and the run carries on without it.
//!
//! On Unix the default name is a filesystem-backed socket in `/tmp`.

use std::io::{BufRead, BufReader, Write};

use interprocess::local_socket::{LocalSocketListener, LocalSocketStream};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FabResult;
use crate::safety::JointViolation;

#[cfg(unix)]
pub const PROGRESS_SOCKET_NAME: &str = "/tmp/clay_fab_progress";

#[cfg(not(unix))]
pub const PROGRESS_SOCKET_NAME: &str = "clay_fab_progress";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        total: usize,
        start_index: usize,
        dry_run: bool,
    },
    ElementPlaced {
        index: usize,
        total: usize,
        highest_placed_z: f64,
    },
    JointRecovery {
        index: usize,
        violation: JointViolation,
    },
    RunFinished {
        completed: usize,
        recoveries: usize,
    },
    RunAborted {
        last_completed: Option<usize>,
        reason: String,
    },
}

/// Writing end of the feed.
pub struct ProgressReporter {
    stream: Option<LocalSocketStream>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn connect(name: &str) -> FabResult<Self> {
        let stream = LocalSocketStream::connect(name)?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends one event. The first write failure disconnects the reporter.
    pub fn publish(&mut self, event: &ProgressEvent) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let result = serde_json::to_string(event)
            .map_err(std::io::Error::from)
            .and_then(|line| {
                writeln!(stream, "{line}")?;
                stream.flush()
            });

        if let Err(err) = result {
            warn!(%err, "progress feed lost, continuing without it");
            self.stream = None;
        }
    }
}

/// Reading end of the feed.
pub struct ProgressMonitor {
    listener: LocalSocketListener,
    name: String,
}

impl std::fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&self.name);
        }
    }
}

impl ProgressMonitor {
    /// Binds the listener, removing a socket file left behind by an earlier run.
    pub fn bind(name: &str) -> FabResult<Self> {
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(name);
        }

        let listener = LocalSocketListener::bind(name)?;
        Ok(Self {
            listener,
            name: name.to_string(),
        })
    }

    /// Blocks until a controller connects.
    pub fn accept(&self) -> FabResult<ProgressSubscription> {
        let stream = self.listener.accept()?;
        Ok(ProgressSubscription {
            reader: BufReader::new(stream),
        })
    }
}

pub struct ProgressSubscription {
    reader: BufReader<LocalSocketStream>,
}

impl ProgressSubscription {
    /// Next event, or `None` once the controller hangs up.
    pub fn next_event(&mut self) -> FabResult<Option<ProgressEvent>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line.trim_end())?))
    }
}
