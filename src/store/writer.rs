use std::io;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;
use crate::wal::Wal;

/// Requests served by the task that owns the [`Wal`].
pub(super) enum WalRequest {
    Append {
        event: Event,
        done: oneshot::Sender<io::Result<()>>,
    },
    /// Replace the log with a snapshot.
    Rewrite {
        events: Vec<Event>,
        done: oneshot::Sender<io::Result<()>>,
    },
    AppendCount {
        reply: oneshot::Sender<u64>,
    },
}

/// Serve requests until every sender is gone. Appends already queued behind
/// the one being served ride along and share its fsync.
pub(super) async fn run_writer(mut wal: Wal, mut rx: mpsc::Receiver<WalRequest>) {
    let mut carried: Option<WalRequest> = None;
    loop {
        let request = match carried.take() {
            Some(r) => r,
            None => match rx.recv().await {
                Some(r) => r,
                None => return,
            },
        };

        match request {
            WalRequest::Append { event, done } => {
                let mut waiters = vec![done];
                let mut buffered = wal.buffer(&event);
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalRequest::Append { event, done } => {
                            if buffered.is_ok() {
                                buffered = wal.buffer(&event);
                            }
                            waiters.push(done);
                        }
                        other => {
                            carried = Some(other);
                            break;
                        }
                    }
                }
                commit(&mut wal, buffered, waiters);
            }
            WalRequest::Rewrite { events, done } => {
                let _ = done.send(wal.rewrite(&events));
            }
            WalRequest::AppendCount { reply } => {
                let _ = reply.send(wal.since_rewrite());
            }
        }
    }
}

fn commit(wal: &mut Wal, buffered: io::Result<()>, waiters: Vec<oneshot::Sender<io::Result<()>>>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(waiters.len() as f64);
    let started = Instant::now();
    // Sync even after a failed buffer so the next batch starts clean.
    let synced = wal.sync();
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let failure = buffered.err().or(synced.err());
    for done in waiters {
        let _ = done.send(match &failure {
            None => Ok(()),
            Some(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}
