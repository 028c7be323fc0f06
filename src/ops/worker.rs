use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::ops::generate::{GenerateError, GenerationClient};

/// The work a background job performs.  Payload strings are base64 image
/// uploads prepared on the UI thread.
#[derive(Clone, Debug)]
pub enum JobKind {
    /// Render the sketch with a style prompt.
    Generate { prompt: String, drawing_data: String },
    /// Re-render a previous output with an adjusted prompt.
    Refine { prompt: String, image_data: String },
    /// Convert an imported photo into a doodle.
    DoodleConvert { image_data: String },
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Generate { .. } => "generate",
            JobKind::Refine { .. } => "refine",
            JobKind::DoodleConvert { .. } => "doodle-convert",
        }
    }
}

/// A finished background job, tagged with the token it was issued under.
pub struct Completion {
    token: u64,
    pub kind: JobKind,
    pub result: Result<Vec<u8>, GenerateError>,
}

/// Runs generation requests off the UI thread, one at a time.
///
/// Every submission bumps a monotonic token and spawns a worker thread with
/// a client clone.  Blocking requests cannot be cancelled mid-flight, so
/// superseding works by token: `poll` discards any completion whose token is
/// no longer the latest, and `cancel_pending` bumps the token without
/// submitting, orphaning whatever is still running.
pub struct GenerationWorker {
    latest: Arc<AtomicU64>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    in_flight: usize,
}

impl Default for GenerationWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationWorker {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            latest: Arc::new(AtomicU64::new(0)),
            sender,
            receiver,
            in_flight: 0,
        }
    }

    /// True while a job is running whose result is still wanted.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Submit a job, superseding any in-flight one.  The older job keeps
    /// running to completion but its result will be discarded.
    pub fn submit(&mut self, client: &GenerationClient, api_key: Option<String>, kind: JobKind) {
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let sender = self.sender.clone();
        let client = client.clone();
        let job = kind.clone();
        crate::log_info!("worker: submitting {} job (token {})", kind.label(), token);
        self.in_flight = 1;

        std::thread::spawn(move || {
            let key = api_key.as_deref();
            let result = match &job {
                JobKind::Generate { prompt, drawing_data } => {
                    client.generate(prompt, drawing_data, key)
                }
                JobKind::Refine { prompt, image_data } => client.refine(prompt, image_data, key),
                JobKind::DoodleConvert { image_data } => client.convert_to_doodle(image_data, key),
            };
            // The UI may have exited; a dead channel is fine.
            let _ = sender.send(Completion {
                token,
                kind: job,
                result,
            });
        });
    }

    /// Invalidate whatever is in flight without submitting a replacement.
    pub fn cancel_pending(&mut self) {
        if self.in_flight > 0 {
            let token = self.latest.fetch_add(1, Ordering::SeqCst);
            crate::log_info!("worker: cancelled pending job (token {})", token);
            self.in_flight = 0;
        }
    }

    /// Drain finished jobs, returning the completion that still matters (if
    /// any).  Stale completions from superseded submissions are logged and
    /// dropped.
    pub fn poll(&mut self) -> Option<Completion> {
        let mut current = None;
        while let Ok(completion) = self.receiver.try_recv() {
            if completion.token == self.latest.load(Ordering::SeqCst) {
                current = Some(completion);
            } else {
                crate::log_info!(
                    "worker: dropping stale {} completion (token {})",
                    completion.kind.label(),
                    completion.token
                );
            }
        }
        if current.is_some() {
            self.in_flight = 0;
        }
        current
    }

    #[cfg(test)]
    fn inject(&self, token: u64, kind: JobKind, result: Result<Vec<u8>, GenerateError>) {
        self.sender
            .send(Completion {
                token,
                kind,
                result,
            })
            .ok();
    }

    #[cfg(test)]
    fn bump_token(&mut self) -> u64 {
        self.in_flight = 1;
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_job() -> JobKind {
        JobKind::Generate {
            prompt: "p".to_string(),
            drawing_data: "d".to_string(),
        }
    }

    #[test]
    fn poll_returns_latest_token_only() {
        let mut worker = GenerationWorker::new();
        let stale = worker.bump_token();
        let current = worker.bump_token();

        worker.inject(stale, generate_job(), Ok(vec![1]));
        worker.inject(current, generate_job(), Ok(vec![2]));

        let completion = worker.poll().unwrap();
        assert_eq!(completion.token, current);
        assert_eq!(completion.result.unwrap(), vec![2]);
        assert!(!worker.is_busy());
        assert!(worker.poll().is_none());
    }

    #[test]
    fn cancel_orphans_in_flight_job() {
        let mut worker = GenerationWorker::new();
        let token = worker.bump_token();
        assert!(worker.is_busy());

        worker.cancel_pending();
        assert!(!worker.is_busy());

        // The orphaned job finishes later; its completion is discarded.
        worker.inject(token, generate_job(), Ok(vec![9]));
        assert!(worker.poll().is_none());
    }

    #[test]
    fn failed_completion_is_delivered() {
        let mut worker = GenerationWorker::new();
        let token = worker.bump_token();
        worker.inject(
            token,
            generate_job(),
            Err(GenerateError::Network("down".to_string())),
        );

        let completion = worker.poll().unwrap();
        assert!(completion.result.is_err());
    }
}
