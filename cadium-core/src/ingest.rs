/// Model ingestion: URL to attached, normalized, styled model
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{Configuration, LoadMode, LoadPolicy};
use crate::error::ViewerError;
use crate::loader::{extension_of, Fetch, LoaderRegistry, MeshFormat, MeshParser, Parsed};
use crate::normalize::normalize;
use crate::render::SoftwareRenderer;
use crate::scene::{Material, Model, Node, Scene};
use crate::sync::{place_model, style_model};
use crate::viewport::ViewportEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading {
        generation: u64,
        url: String,
        started: Instant,
    },
    Attached {
        generation: u64,
        url: String,
    },
    Failed {
        generation: u64,
        url: String,
        error: ViewerError,
    },
}

/// What a loader job sends back, tagged with the generation it was started for
struct LoadOutcome {
    generation: u64,
    url: String,
    format: MeshFormat,
    result: Result<Node, ViewerError>,
}

/// The only path that adds or removes the scene's model.
///
/// Every `load` bumps the generation token. Outcomes are matched against the
/// current token when they are drained in [`ModelIngest::poll`]; anything
/// older is dropped without touching the scene or the loading signal. A job
/// that was superseded keeps running to completion, its result is simply
/// ignored.
pub struct ModelIngest {
    registry: Arc<LoaderRegistry>,
    fetcher: Arc<dyn Fetch>,
    policy: LoadPolicy,
    generation: u64,
    state: LoadState,
    tx: Sender<LoadOutcome>,
    rx: Receiver<LoadOutcome>,
}

impl ModelIngest {
    pub fn new(registry: Arc<LoaderRegistry>, fetcher: Arc<dyn Fetch>, policy: LoadPolicy) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            registry,
            fetcher,
            policy,
            generation: 0,
            state: LoadState::Idle,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading { .. })
    }

    pub fn policy(&self) -> &LoadPolicy {
        &self.policy
    }

    /// Start loading `url`, superseding any load still in flight.
    pub fn load(&mut self, url: &str) -> Vec<ViewportEvent> {
        self.generation += 1;
        let generation = self.generation;
        let mut events = vec![ViewportEvent::Loading(true)];

        let extension = extension_of(url);
        let parser = extension.as_deref().and_then(|ext| self.registry.resolve(ext));
        let Some(parser) = parser else {
            self.fail(generation, url, ViewerError::UnsupportedFormat { extension }, &mut events);
            return events;
        };

        debug!("loading {url} as {} (generation {generation})", parser.format());
        self.state = LoadState::Loading {
            generation,
            url: url.to_string(),
            started: Instant::now(),
        };

        let job = LoadJob {
            generation,
            url: url.to_string(),
            parser,
            fetcher: Arc::clone(&self.fetcher),
            limit: self.policy.max_bytes,
            tx: self.tx.clone(),
        };

        match self.policy.mode {
            LoadMode::Inline => job.run(),
            LoadMode::Background => {
                let spawned = thread::Builder::new()
                    .name(format!("cadium-load-{generation}"))
                    .spawn(move || job.run());
                if let Err(err) = spawned {
                    self.fail(generation, url, ViewerError::from(err), &mut events);
                }
            }
        }
        events
    }

    /// Deliver finished loads for the current generation and enforce the
    /// load timeout. Called once per frame.
    pub fn poll(
        &mut self,
        scene: &mut Scene,
        config: &Configuration,
        renderer: &mut SoftwareRenderer,
    ) -> Vec<ViewportEvent> {
        let mut events = Vec::new();

        while let Ok(outcome) = self.rx.try_recv() {
            let current = matches!(
                &self.state,
                LoadState::Loading { generation, .. } if *generation == outcome.generation
            );
            if !current {
                debug!(
                    "discarding stale load of {} (generation {}, current {})",
                    outcome.url, outcome.generation, self.generation
                );
                continue;
            }

            self.finish(outcome, scene, config, renderer, &mut events);
        }

        if let (LoadState::Loading { generation, url, started }, Some(timeout)) =
            (&self.state, self.policy.timeout())
        {
            if started.elapsed() >= timeout {
                let (generation, url) = (*generation, url.clone());
                // Bump so the late result is treated as stale
                self.generation += 1;
                self.fail(generation, &url, ViewerError::Timeout { url: url.clone(), after: timeout }, &mut events);
            }
        }

        events
    }

    /// Supersede whatever is in flight without starting anything new.
    pub fn cancel(&mut self) {
        self.generation += 1;
        if self.is_loading() {
            self.state = LoadState::Idle;
        }
    }

    fn finish(
        &mut self,
        outcome: LoadOutcome,
        scene: &mut Scene,
        config: &Configuration,
        renderer: &mut SoftwareRenderer,
        events: &mut Vec<ViewportEvent>,
    ) {
        let LoadOutcome {
            generation,
            url,
            format,
            result,
        } = outcome;

        let prepared = result.and_then(|content| {
            let normalization = normalize(&content, format)?;
            let mut model = Model::new(url.clone(), format, content);
            model.normalization = normalization;
            style_model(&mut model, config, true);
            place_model(&mut model, config);
            Ok(model)
        });

        match prepared {
            Ok(model) => {
                if let Some(old) = scene.detach_model() {
                    debug!("disposing previous model {}", old.url);
                    renderer.release(&old.content);
                }
                let triangles = model.content.triangle_count();
                scene.attach_model(model);
                info!("attached {url} ({format}, {triangles} triangles)");
                self.state = LoadState::Attached {
                    generation,
                    url: url.clone(),
                };
                events.push(ViewportEvent::ModelAttached {
                    url,
                    format,
                    triangles,
                });
                events.push(ViewportEvent::Loading(false));
            }
            Err(error) => self.fail(generation, &url, error, events),
        }
    }

    fn fail(&mut self, generation: u64, url: &str, error: ViewerError, events: &mut Vec<ViewportEvent>) {
        warn!("load of {url} failed: {error}");
        self.state = LoadState::Failed {
            generation,
            url: url.to_string(),
            error: error.clone(),
        };
        events.push(ViewportEvent::LoadFailed {
            url: url.to_string(),
            error,
        });
        events.push(ViewportEvent::Loading(false));
    }
}

/// Fetch and parse for one generation, off the render path
struct LoadJob {
    generation: u64,
    url: String,
    parser: Arc<dyn MeshParser>,
    fetcher: Arc<dyn Fetch>,
    limit: u64,
    tx: Sender<LoadOutcome>,
}

impl LoadJob {
    fn run(self) {
        let result = self
            .fetcher
            .fetch(&self.url, self.limit)
            .and_then(|bytes| self.parser.parse(&bytes))
            .map(|parsed| match parsed {
                Parsed::Object(node) => node,
                Parsed::Geometry(mesh) => Node::mesh("", mesh, Material::native()),
            });

        let outcome = LoadOutcome {
            generation: self.generation,
            url: self.url,
            format: self.parser.format(),
            result,
        };
        // The receiver is gone once the viewport is disposed
        if self.tx.send(outcome).is_err() {
            debug!("load finished after its viewport was dropped");
        }
    }
}
