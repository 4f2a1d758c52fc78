//! Navigation behind a single-owner worker thread.
//!
//! Location callbacks can arrive from any thread. Rather than locking the
//! engine, every call is turned into a message and a single worker applies
//! them in order, so the engine only ever has one writer.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace};

use crate::config::NavigationConfig;
use crate::error::{Error, Result};
use crate::model::{PositionSample, Route};
use crate::navigation::{InstructionSink, NavigationEngine, NavigationSnapshot};

enum Command {
    Start(Box<Route>, Sender<Result<()>>),
    Update(PositionSample),
    Stop,
    Snapshot(Sender<NavigationSnapshot>),
    Shutdown,
}

/// Handle to a navigation worker. Cheap calls, all serialised on the worker.
pub struct SessionHandle {
    inbox: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Spawn a worker owning a fresh engine that speaks through `sink`.
    pub fn spawn<S>(config: NavigationConfig, sink: S) -> Result<Self>
    where
        S: InstructionSink + Send + 'static,
    {
        let (inbox, commands) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("innav-navigation".into())
            .spawn(move || run(NavigationEngine::new(config, sink), commands))?;

        Ok(Self {
            inbox,
            worker: Some(worker),
        })
    }

    /// Start navigating `route`. Waits for the worker's verdict.
    pub fn start(&self, route: Route) -> Result<()> {
        let (reply, verdict) = mpsc::channel();
        self.send(Command::Start(Box::new(route), reply))?;
        verdict.recv().map_err(|_| Error::SessionClosed)?
    }

    /// Queue a position fix.
    pub fn update(&self, sample: PositionSample) -> Result<()> {
        self.send(Command::Update(sample))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// State after every previously queued command has been applied.
    pub fn snapshot(&self) -> Result<NavigationSnapshot> {
        let (reply, snapshot) = mpsc::channel();
        self.send(Command::Snapshot(reply))?;
        snapshot.recv().map_err(|_| Error::SessionClosed)
    }

    /// Shut the worker down and wait for it. Later calls fail with
    /// [`Error::SessionClosed`].
    pub fn shutdown(&mut self) {
        let _ = self.inbox.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Navigation worker panicked");
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::SessionClosed);
        }
        self.inbox.send(command).map_err(|_| Error::SessionClosed)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<S: InstructionSink>(mut engine: NavigationEngine<S>, commands: Receiver<Command>) {
    debug!("Navigation worker started");
    for command in commands {
        match command {
            Command::Start(route, reply) => {
                let _ = reply.send(engine.start_navigation(&route));
            }
            Command::Update(sample) => {
                if let Err(reason) = engine.update_fix(&sample) {
                    trace!("Fix ignored: {reason}");
                }
            }
            Command::Stop => engine.stop_navigation(),
            Command::Snapshot(reply) => {
                let _ = reply.send(engine.snapshot());
            }
            Command::Shutdown => break,
        }
    }
    debug!("Navigation worker finished");
}
