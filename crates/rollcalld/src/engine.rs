use rollcall_core::{run_batch, AttendanceRun, Config, EuclideanMatcher, FaceEngine, Gallery, GalleryError};
use rollcall_ledger::{Ledger, LedgerError, RecordedRun};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face engine error: {0}")]
    Face(#[from] rollcall_core::EngineError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("cannot spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of one attendance request.
#[derive(Debug)]
pub struct MarkResult {
    pub run: AttendanceRun,
    /// Everyone accepted in the request, and who of them was new today.
    pub recorded: RecordedRun,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Mark {
        paths: Vec<PathBuf>,
        reply: oneshot::Sender<Result<MarkResult, EngineError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    identities: Arc<AtomicUsize>,
}

impl EngineHandle {
    /// Match `paths` against the gallery and record today's attendance.
    pub async fn mark(&self, paths: Vec<PathBuf>) -> Result<MarkResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Mark { paths, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Rebuild the gallery from disk. Returns the new identity count.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reload { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Identity count of the gallery currently in use.
    pub fn identities(&self) -> usize {
        self.identities.load(Ordering::Relaxed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Mark requests whose caller has already given up are dropped unrun when
/// dequeued, and a run whose caller gives up meanwhile is not recorded.
///
/// The gallery is loaded before the thread starts. A missing gallery
/// directory is not fatal: the daemon starts with an empty gallery and
/// matches nobody until a successful reload.
pub fn spawn_engine<E>(engine: E, config: &Config) -> Result<EngineHandle, EngineError>
where
    E: FaceEngine + Send + 'static,
{
    let dataset = config.data.dataset_path.clone();
    let threshold = config.matching.threshold;
    let ledger = Ledger::new(&config.output.attendance_dir);

    let mut gallery = match Gallery::load(&dataset, &engine) {
        Ok((gallery, _)) => gallery,
        Err(err) => {
            tracing::warn!(error = %err, "starting with an empty gallery");
            Gallery::default()
        }
    };
    let identities = Arc::new(AtomicUsize::new(gallery.len()));

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let shared_count = Arc::clone(&identities);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(identities = gallery.len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Mark { paths, reply } => {
                        if reply.is_closed() {
                            tracing::warn!(images = paths.len(), "caller gave up while queued, skipping run");
                            continue;
                        }
                        let run = run_batch(&engine, &gallery, &EuclideanMatcher, threshold, &paths);
                        if reply.is_closed() {
                            tracing::warn!(
                                present = run.present.len(),
                                "caller gave up before the run finished, not recording"
                            );
                            continue;
                        }
                        let result = ledger
                            .record(run.present.as_slice(), chrono::Local::now().naive_local())
                            .map(|recorded| MarkResult { run, recorded })
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let result = match Gallery::load(&dataset, &engine) {
                            Ok((fresh, _)) => {
                                gallery = fresh;
                                shared_count.store(gallery.len(), Ordering::Relaxed);
                                Ok(gallery.len())
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "gallery reload failed, keeping the current one");
                                Err(err.into())
                            }
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, identities })
}
