//! Synthetic record source
//!
//! Replays a fixed list of records into every session it opens, then blocks
//! like a live facility until the session is stopped. Used by the test suite
//! and by the `--synthetic` driver mode to exercise the whole pipeline
//! without kernel support.

use std::io;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use super::{
    NameClaim, OpenedSession, RawRecord, RecordStream, SessionConfig, SessionControl,
    SessionRegistry, TraceProvider,
};
use crate::domain::StartFailure;

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: Vec<RawRecord>,
    registry: SessionRegistry,
    deny_reason: Option<String>,
    fail_stop: bool,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(script: Vec<RawRecord>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Every `open` fails as if the caller lacked privileges
    #[must_use]
    pub fn denying(reason: impl Into<String>) -> Self {
        Self {
            deny_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// `stop` reports an error (after releasing the stream anyway)
    #[must_use]
    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

impl TraceProvider for ScriptedProvider {
    fn open(&self, name: &str, config: &SessionConfig) -> Result<OpenedSession, StartFailure> {
        if let Some(reason) = &self.deny_reason {
            return Err(StartFailure::PermissionDenied(reason.clone()));
        }
        config.validate()?;
        let claim = self.registry.claim(name)?;

        // Zero-capacity channel that never carries a message: dropping the
        // sender is the stop signal.
        let (stop_tx, stop_rx) = bounded::<()>(0);

        debug!("Scripted session '{name}' opened with {} records", self.script.len());
        Ok(OpenedSession {
            control: Box::new(ScriptedControl {
                stop_tx: Some(stop_tx),
                claim: Some(claim),
                fail_stop: self.fail_stop,
            }),
            stream: Box::new(ScriptedStream {
                pending: self.script.clone(),
                stop_rx,
            }),
        })
    }
}

struct ScriptedControl {
    stop_tx: Option<Sender<()>>,
    claim: Option<NameClaim>,
    fail_stop: bool,
}

impl SessionControl for ScriptedControl {
    fn stop(&mut self) -> io::Result<()> {
        self.stop_tx.take();
        self.claim.take();
        if self.fail_stop {
            return Err(io::Error::other("scripted stop failure"));
        }
        Ok(())
    }
}

struct ScriptedStream {
    pending: Vec<RawRecord>,
    stop_rx: Receiver<()>,
}

impl RecordStream for ScriptedStream {
    fn process(&mut self, deliver: &mut dyn FnMut(RawRecord) -> bool) -> io::Result<()> {
        for record in self.pending.drain(..) {
            if !deliver(record) {
                return Ok(());
            }
        }
        // Blocks until the control half drops its sender
        let _ = self.stop_rx.recv();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pid, Tid};
    use std::thread;

    #[test]
    fn test_replays_then_blocks_until_stop() {
        let provider = ScriptedProvider::new(vec![
            RawRecord::sample(Pid(1), Tid(1), vec![0x10, 0x20]),
            RawRecord::lost(Pid(1), 3),
        ]);
        let OpenedSession { mut control, mut stream } =
            provider.open("scripted", &SessionConfig::default()).unwrap();

        let reader = thread::spawn(move || {
            let mut seen = Vec::new();
            stream
                .process(&mut |record| {
                    seen.push(record);
                    true
                })
                .unwrap();
            seen
        });

        control.stop().unwrap();
        let seen = reader.join().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].frames, vec![0x10, 0x20]);
    }

    #[test]
    fn test_denying_provider_fails_open() {
        let provider = ScriptedProvider::denying("not root");
        let err = provider.open("scripted", &SessionConfig::default()).err().unwrap();
        assert!(matches!(err, StartFailure::PermissionDenied(_)));
    }

    #[test]
    fn test_stop_releases_name_even_when_failing() {
        let provider = ScriptedProvider::new(Vec::new()).with_failing_stop();
        let mut opened = provider.open("scripted", &SessionConfig::default()).unwrap();
        assert!(provider.registry().is_active("scripted"));
        assert!(opened.control.stop().is_err());
        assert!(!provider.registry().is_active("scripted"));
    }
}
