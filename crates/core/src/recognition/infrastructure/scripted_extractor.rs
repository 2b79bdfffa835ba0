use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::recognition::domain::embedding_extractor::{EmbeddingExtractor, Extraction};
use crate::shared::frame::Frame;

/// Extractor fake: answers from a queue of scripted results, then falls
/// back to a fixed default. Counts every call.
pub struct ScriptedExtractor {
    queue: Mutex<VecDeque<Result<Extraction, String>>>,
    default: Extraction,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn always(default: Extraction) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Extraction) {
        self.lock().push_back(Ok(result));
    }

    pub fn fail_next(&self, message: &str) {
        self.lock().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Extraction, String>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EmbeddingExtractor for ScriptedExtractor {
    fn extract(&self, _face: &Frame) -> Result<Extraction, Box<dyn std::error::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lock().pop_front() {
            Some(Ok(extraction)) => Ok(extraction),
            Some(Err(message)) => Err(message.into()),
            None => Ok(self.default.clone()),
        }
    }
}
