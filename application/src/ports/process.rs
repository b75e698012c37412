//! Process control port
//!
//! The lifecycle manager tracks "running" purely as presence of a record in
//! its subprocess table, keyed by server name. This port is what a record
//! holds: enough of a process handle to terminate it later. Keeping it a
//! trait lets tests exercise idempotent start/stop with fakes instead of
//! real subprocesses.

use async_trait::async_trait;

/// Handle to a spawned helper process.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// OS process id, if the process is still attached.
    fn id(&self) -> Option<u32>;

    /// Ask the process to terminate. Idempotent; a process that already
    /// exited is not an error.
    async fn terminate(&mut self) -> std::io::Result<()>;
}
