use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::api::Tag;
use crate::data::PostService;

struct Job {
    post_id: u64,
    tx: Sender<Vec<Tag>>,
}

struct Inner {
    service: Arc<dyn PostService>,
    jobs: Sender<Job>,
    stop: Sender<()>,
    cache: Mutex<HashMap<u64, Vec<Tag>>>,
}

/// Resolves tag sets through the post-detail endpoint. The list endpoint does
/// not embed tags, so every rendered post needs one extra fetch; a failed
/// fetch yields an empty tag set instead of failing the page.
pub struct Enricher {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Enricher {
    pub fn new(service: Arc<dyn PostService>, workers: usize) -> Self {
        let workers = if workers == 0 { 2 } else { workers };
        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            service,
            jobs: job_tx,
            stop: stop_tx,
            cache: Mutex::new(HashMap::new()),
        });

        let mut handles = Vec::new();
        for _ in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Self { inner, handles }
    }

    /// Queues a tag fetch and returns the channel the result arrives on.
    /// Fetches for different posts run on separate workers; a dropped or
    /// failed fetch shows up as an empty tag set on the receiving side.
    pub fn enqueue(&self, post_id: u64) -> Receiver<Vec<Tag>> {
        let (tx, rx) = unbounded();
        let job = Job { post_id, tx };
        let _ = self.inner.jobs.send(job);
        rx
    }

    pub fn cached(&self, post_id: u64) -> Option<Vec<Tag>> {
        self.inner.cache.lock().get(&post_id).cloned()
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Enricher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let tags = self.resolve(job.post_id);
        let _ = job.tx.send(tags);
    }

    fn resolve(&self, post_id: u64) -> Vec<Tag> {
        if let Some(tags) = self.cache.lock().get(&post_id) {
            return tags.clone();
        }
        match self.service.get_post(post_id) {
            Ok(post) => {
                // Only successful lookups are cached, so a transient failure
                // is retried the next time the post comes around.
                self.cache.lock().insert(post_id, post.tags.clone());
                post.tags
            }
            Err(_) => Vec::new(),
        }
    }
}
