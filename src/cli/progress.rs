//! CLI-specific progress handling for putusan-dl
//!
//! Renders pipeline [`ProgressEvent`]s on a single spinner line.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use putusan_dl::{ProgressCallback, ProgressEvent};

/// Creates the spinner used while a run is in progress
pub fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:.cyan} {msg}")
            .expect("Failed to create progress style"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Progress manager for a harvesting run
pub struct ProgressManager {
    pub pb: ProgressBar,
    stored: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        let pb = create_spinner();

        // Print initial message to stderr
        eprintln!("{message}");

        Self {
            pb,
            stored: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Callback to hand to the pipeline
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        let stored = Arc::clone(&self.stored);
        let failed = Arc::clone(&self.failed);
        Arc::new(move |event: &ProgressEvent| {
            match event {
                ProgressEvent::PageStarted { page } => pb.set_prefix(format!("page {page}")),
                ProgressEvent::PageFinished { .. } => {}
                ProgressEvent::Stored { key } => {
                    stored.fetch_add(1, Ordering::Relaxed);
                    pb.set_message(format!("✅ {key}"));
                }
                ProgressEvent::Failed { key, reason } => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    pb.set_message(format!("⚠️  {key}: {reason}"));
                }
            }
            pb.tick();
        })
    }

    pub fn stored(&self) -> usize {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Stop the spinner and leave a summary line
    pub fn finish(&self) {
        self.pb.finish_with_message(format!(
            "done: {} stored, {} failed",
            self.stored(),
            self.failed()
        ));
    }
}
