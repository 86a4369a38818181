//! Single consumer that runs both classifiers on every admitted input.
//!
//! Camera frames reach the consumer through a [`FrameAdmitter`], which holds
//! an admission permit for each frame until both classifiers have returned.
//! Photos go through a [`PhotoSubmitter`], which never touches the gate.

use crate::classifier::{build_classifier, Classifier};
use crate::config::Config;
use crate::frame::{Frame, Image, Photo};
use crate::gate::{AdmissionGate, Permit};
use crate::report::{Outcome, Report, ResultSink, Source};
use anyhow::{anyhow, Context};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// The two classifiers plus the place their verdicts go.
pub struct Pipeline {
    general: Arc<dyn Classifier>,
    healthy: Arc<dyn Classifier>,
    sink: Arc<dyn ResultSink>,
    threshold: f32,
}

impl Pipeline {
    pub fn new(
        general: Arc<dyn Classifier>,
        healthy: Arc<dyn Classifier>,
        sink: Arc<dyn ResultSink>,
        threshold: f32,
    ) -> Self {
        Self {
            general,
            healthy,
            sink,
            threshold,
        }
    }

    pub fn from_config(cfg: &Config, sink: Arc<dyn ResultSink>) -> anyhow::Result<Self> {
        let general = build_classifier("general", &cfg.general)?;
        let healthy = build_classifier("healthy", &cfg.healthy)?;
        Ok(Self::new(general, healthy, sink, cfg.confident_threshold))
    }

    fn invoke(&self, classifier: &dyn Classifier, image: &Image, source: &Source) -> Outcome {
        match classifier.classify(image) {
            Ok(ranking) => Outcome::from_ranking(&ranking, self.threshold),
            Err(e) => {
                error!(classifier = classifier.name(), ?source, "classification failed: {e:#}");
                Outcome::Failed {
                    message: format!("{e:#}"),
                }
            }
        }
    }

    fn run(&self, job: Job) {
        let Job { input, permit } = job;
        let (source, image) = match input {
            Input::Frame(f) => (Source::Frame { seq: f.seq }, f.image),
            Input::Photo(p) => (Source::Photo { origin: p.origin }, p.image),
        };
        trace!(?source, gated = permit.is_some(), "dispatching");
        let general = self.invoke(self.general.as_ref(), &image, &source);
        let healthy = self.invoke(self.healthy.as_ref(), &image, &source);
        drop(permit);

        let report = Report {
            source,
            general,
            healthy,
        };
        if let Err(e) = self.sink.publish(&report) {
            error!("failed to publish report: {e:#}");
        }
    }
}

enum Input {
    Frame(Frame),
    Photo(Photo),
}

struct Job {
    input: Input,
    permit: Option<Permit>,
}

enum Message {
    Job(Job),
    Stop,
}

/// Owns the worker thread that performs classification.
pub struct Dispatcher {
    jobs: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(pipeline: Pipeline) -> anyhow::Result<Self> {
        let (jobs, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("snackgate-dispatch".into())
            .spawn(move || {
                debug!("dispatch worker started");
                for msg in rx {
                    match msg {
                        Message::Job(job) => pipeline.run(job),
                        Message::Stop => break,
                    }
                }
                debug!("dispatch worker stopped");
            })
            .context("failed to spawn dispatch worker")?;
        Ok(Self {
            jobs,
            worker: Some(worker),
        })
    }

    /// Hands out the gated stream entry point and the ungated photo entry point.
    pub fn entry_points(&self, gate: AdmissionGate) -> (FrameAdmitter, PhotoSubmitter) {
        (
            FrameAdmitter {
                gate,
                jobs: self.jobs.clone(),
            },
            self.photo_submitter(),
        )
    }

    /// Ungated entry point alone, for callers that never read the stream.
    pub fn photo_submitter(&self) -> PhotoSubmitter {
        PhotoSubmitter {
            jobs: self.jobs.clone(),
        }
    }

    /// Finishes the jobs already queued, then stops the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.jobs.send(Message::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("dispatch worker panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Gated entry point for the camera stream.
#[derive(Clone)]
pub struct FrameAdmitter {
    gate: AdmissionGate,
    jobs: Sender<Message>,
}

impl FrameAdmitter {
    /// Blocks until the gate admits the frame, then queues it for dispatch.
    pub fn admit_frame(&self, frame: Frame) -> anyhow::Result<()> {
        let permit = self.gate.acquire();
        let seq = frame.seq;
        trace!(seq, "frame admitted");
        self.jobs
            .send(Message::Job(Job {
                input: Input::Frame(frame),
                permit: Some(permit),
            }))
            .map_err(|_| anyhow!("dispatcher stopped, frame {seq} dropped"))
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }
}

/// Ungated entry point for single photos.
#[derive(Clone)]
pub struct PhotoSubmitter {
    jobs: Sender<Message>,
}

impl PhotoSubmitter {
    /// Queues the photo for dispatch without waiting on the gate.
    pub fn admit_photo(&self, photo: Photo) -> anyhow::Result<()> {
        debug!(origin = ?photo.origin, "photo submitted");
        self.jobs
            .send(Message::Job(Job {
                input: Input::Photo(photo),
                permit: None,
            }))
            .map_err(|_| anyhow!("dispatcher stopped, photo dropped"))
    }
}
