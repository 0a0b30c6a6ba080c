use std::future::Future;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const HEARTBEAT_TICK: Duration = Duration::from_millis(50);
const HEARTBEAT_CYCLE: u64 = 100;

/// Terminal progress for one run: a row counter plus transient heartbeats.
#[derive(Clone)]
pub struct Progress {
    multi: MultiProgress,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    pub fn rows_bar(&self, total: usize) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}<{eta}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        pb.set_message("Processing Dialogues");
        pb
    }

    pub fn heartbeat(&self, label: &str) -> Heartbeat {
        let pb = self.multi.add(ProgressBar::new(HEARTBEAT_CYCLE));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:30}] {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(label.to_string());
        Heartbeat::start(pb)
    }

    /// Runs `work` with a heartbeat beside it and always stops the heartbeat
    /// before returning, whatever `work` produced.
    pub async fn while_running<F, T>(&self, label: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let heartbeat = self.heartbeat(label);
        let out = work.await;
        heartbeat.stop().await;
        out
    }
}

/// Indeterminate progress for an external step: the bar fills and resets until stopped.
pub struct Heartbeat {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(pb: ProgressBar) -> Self {
        let (tx, mut rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_TICK);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        pb.inc(1);
                        if pb.position() >= HEARTBEAT_CYCLE {
                            pb.set_position(0);
                        }
                    }
                }
            }
            pb.finish_and_clear();
        });
        Self {
            stop: Some(tx),
            task: Some(task),
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}
