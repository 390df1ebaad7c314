//! # Trace Session Lifecycle
//!
//! ```text
//!        start()              stop()
//! Idle ───────────► Started ───────────► Stopped
//!                     │                     │ start() again
//!                     │ begin_consuming()   ▼
//!                     ▼                  Started ...
//!             reader thread ──channel──► consumer thread
//!          (RecordStream::process)     (StackEventDispatcher)
//! ```
//!
//! A controller runs at most one session at a time. `stop` is the only way to
//! end the blocking record loop: it issues the control-stop, the loop drains
//! and returns, the channel disconnects, the consumer finishes the backlog and
//! exits. [`ConsumerTask::join`] must therefore only be called after `stop`.

use crossbeam_channel::bounded;
use log::{debug, info, warn};
use std::io;
use std::thread::{self, JoinHandle};

use super::dispatcher::{DispatchStats, StackEventDispatcher};
use crate::domain::{SessionError, StartFailure};
use crate::symbolization::SymbolResolver;
use crate::trace::{OpenedSession, RecordStream, SessionConfig, SessionControl, TraceProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Stopped,
}

/// Identifies the session a controller started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: u64,
    name: String,
}

impl SessionHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct ActiveSession {
    handle: SessionHandle,
    control: Box<dyn SessionControl>,
    /// Taken by `begin_consuming`
    stream: Option<Box<dyn RecordStream>>,
    channel_capacity: usize,
}

pub struct TraceSessionController<P> {
    provider: P,
    state: SessionState,
    active: Option<ActiveSession>,
    next_id: u64,
}

impl<P: TraceProvider> TraceSessionController<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: SessionState::Idle,
            active: None,
            next_id: 1,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open a tracing session named `name`
    ///
    /// # Errors
    /// [`SessionError::StartFailed`] when a session is already running on this
    /// controller or the facility refuses (privileges, name collision, config)
    pub fn start(
        &mut self,
        name: &str,
        config: &SessionConfig,
    ) -> Result<SessionHandle, SessionError> {
        let start_failed = |reason| SessionError::StartFailed {
            name: name.to_string(),
            reason,
        };

        if self.state == SessionState::Started {
            return Err(start_failed(StartFailure::AlreadyStarted));
        }

        let OpenedSession { control, stream } =
            self.provider.open(name, config).map_err(start_failed)?;

        let handle = SessionHandle {
            id: self.next_id,
            name: name.to_string(),
        };
        self.next_id += 1;
        self.active = Some(ActiveSession {
            handle: handle.clone(),
            control,
            stream: Some(stream),
            channel_capacity: config.channel_capacity,
        });
        self.state = SessionState::Started;

        info!("Trace session '{name}' started");
        Ok(handle)
    }

    /// Spawn the reader and consumer threads for a started session
    ///
    /// # Errors
    /// Unknown handle, a session that is already being consumed, or a failed
    /// thread spawn
    pub fn begin_consuming<R>(
        &mut self,
        handle: &SessionHandle,
        mut dispatcher: StackEventDispatcher<R>,
    ) -> Result<ConsumerTask, SessionError>
    where
        R: SymbolResolver + 'static,
    {
        let session = self.session_mut(handle)?;
        let mut stream = session
            .stream
            .take()
            .ok_or_else(|| SessionError::AlreadyConsuming(handle.name.clone()))?;
        let (tx, rx) = bounded(session.channel_capacity);

        let consumer = thread::Builder::new()
            .name(format!("{}-consumer", handle.name))
            .spawn(move || {
                for record in rx {
                    dispatcher.on_record(&record);
                }
                debug!("Consumer drained: {:?}", dispatcher.stats);
                dispatcher.stats
            })?;

        // If this spawn fails the closure (and the sender) is dropped, which
        // disconnects the channel and lets the consumer exit
        let reader = thread::Builder::new()
            .name(format!("{}-reader", handle.name))
            .spawn(move || {
                let result = stream.process(&mut |record| tx.send(record).is_ok());
                if let Err(e) = &result {
                    warn!("Record loop ended with error: {e}");
                }
                result
            })?;

        debug!("Consuming trace session '{}'", handle.name);
        Ok(ConsumerTask { reader, consumer })
    }

    /// Issue the control-stop for a started session
    ///
    /// The session is released and the controller moves to `Stopped` whether
    /// or not the facility stopped cleanly.
    ///
    /// # Errors
    /// [`SessionError::UnknownHandle`] for a handle that is not running, or the
    /// non-fatal [`SessionError::StopFailed`]
    pub fn stop(&mut self, handle: &SessionHandle) -> Result<(), SessionError> {
        self.session_mut(handle)?;
        let Some(mut session) = self.active.take() else {
            return Err(SessionError::UnknownHandle(handle.id));
        };
        self.state = SessionState::Stopped;

        match session.control.stop() {
            Ok(()) => {
                info!("Trace session '{}' stopped", handle.name);
                Ok(())
            }
            Err(source) => {
                warn!("Trace session '{}' did not stop cleanly: {source}", handle.name);
                Err(SessionError::StopFailed {
                    name: handle.name.clone(),
                    source,
                })
            }
        }
    }

    fn session_mut(&mut self, handle: &SessionHandle) -> Result<&mut ActiveSession, SessionError> {
        self.active
            .as_mut()
            .filter(|s| s.handle.id == handle.id)
            .ok_or(SessionError::UnknownHandle(handle.id))
    }
}

impl<P> Drop for TraceSessionController<P> {
    fn drop(&mut self) {
        if let Some(mut session) = self.active.take() {
            if let Err(e) = session.control.stop() {
                warn!("Trace session '{}' did not stop cleanly: {e}", session.handle.name);
            }
        }
    }
}

/// The running reader and consumer threads of one session
pub struct ConsumerTask {
    reader: JoinHandle<io::Result<()>>,
    consumer: JoinHandle<DispatchStats>,
}

impl ConsumerTask {
    /// Wait for both threads. Only returns once the session has been stopped.
    ///
    /// # Errors
    /// A thread panicked, or the record loop failed
    pub fn join(self) -> Result<DispatchStats, SessionError> {
        let reader = self.reader.join();
        let stats = self
            .consumer
            .join()
            .map_err(|_| SessionError::ThreadPanicked("consumer"))?;
        reader.map_err(|_| SessionError::ThreadPanicked("reader"))??;
        Ok(stats)
    }
}
