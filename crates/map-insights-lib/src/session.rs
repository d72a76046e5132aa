//! Map session: layers, counters and the viewport pipeline
//!
//! A [`MapSession`] owns a worker task. View-state events are converted to a rectangle right
//! away and handed to the [`Debouncer`]; once a burst settles the worker runs one aggregation
//! pass on the blocking pool and pushes a [`Snapshot`] to every registered observer.
//!
//! Every accepted viewport bumps a request generation. The worker only publishes when the
//! generation it computed against is still the newest one, so a result for an old viewport is
//! never delivered after a newer viewport has been requested.

use crate::aggregate::{self, AggregationResult, AttributeCounter, CounterId, Insights};
use crate::color::{ColorScale, ColorTarget, build_scale};
use crate::viewport::{self, ProjectedBounds, ViewState};
use crate::{
    BoundingBox, ColorMode, Config, Debouncer, InsightsError, Layer, LayerId, LayerStyle,
    Properties, Result, SpatialIndex, loader,
};
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of one aggregation pass
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    /// Publication number, starting at 1 and increasing by one per snapshot
    pub sequence: u64,
    pub result: AggregationResult,
    pub insights: Insights,
}

/// Receives every published snapshot
///
/// Called on the session's worker task; implementations should return quickly.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &Snapshot);
}

impl<F> SnapshotObserver for F
where
    F: Fn(&Snapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// Layers together with the index built from them, swapped as one unit
#[derive(Clone, Default)]
struct Dataset {
    layers: Vec<Layer>,
    index: Arc<SpatialIndex>,
}

impl Dataset {
    fn with_layers(layers: Vec<Layer>) -> Self {
        let index = Arc::new(SpatialIndex::from_layers(&layers));
        Self { layers, index }
    }

    fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }
}

#[derive(Debug, Clone, Copy)]
struct ViewRequest {
    generation: u64,
    rect: BoundingBox,
}

enum Job {
    Refresh,
    Shutdown,
}

/// Cached scale plus the inputs it was built from
struct CachedScale {
    attribute: String,
    scheme: String,
    scale: Arc<ColorScale>,
}

struct Shared {
    config: Config,
    dataset: RwLock<Arc<Dataset>>,
    counters: RwLock<Vec<AttributeCounter>>,
    scales: DashMap<(LayerId, ColorTarget), CachedScale>,
    observers: RwLock<Vec<Arc<dyn SnapshotObserver>>>,
    latest: RwLock<Option<Arc<Snapshot>>>,
    next_layer_id: AtomicU64,
    next_counter_id: AtomicU64,
    /// Generation of the newest accepted viewport
    requested: AtomicU64,
    published: AtomicU64,
    debouncer: Debouncer<ViewRequest>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl Shared {
    fn dataset(&self) -> Arc<Dataset> {
        self.dataset
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a private copy of the dataset and swap it in
    fn update_dataset<R>(&self, f: impl FnOnce(&mut Dataset) -> Result<R>) -> Result<R> {
        let mut guard = self.dataset.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Dataset::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    fn invalidate_scales(&self, layer_id: LayerId) {
        self.scales.retain(|(id, _), _| *id != layer_id);
    }

    fn refresh(&self) {
        // A closed channel means the worker is gone; nothing left to refresh
        let _ = self.jobs.send(Job::Refresh);
    }

    fn publish(&self, result: AggregationResult, insights: Insights) {
        let sequence = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot {
            sequence,
            result,
            insights,
        });
        tracing::debug!(
            "Publishing snapshot {}: {} visible features",
            sequence,
            snapshot.insights.total_visible
        );

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_snapshot(&snapshot);
        }
    }
}

/// Cloneable access to a running session, for feeding events from other tasks
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

/// Owner of a session and its worker task
///
/// Dereferences to [`SessionHandle`] for all operations. Dropping the session stops the worker.
pub struct MapSession {
    handle: SessionHandle,
    worker: Option<JoinHandle<()>>,
}

impl MapSession {
    /// Start a session with no layers
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns the error of [`Config::validate`].
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;

        let (debouncer, views) = Debouncer::new(config.debounce());
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            dataset: RwLock::new(Arc::new(Dataset::default())),
            counters: RwLock::new(Vec::new()),
            scales: DashMap::new(),
            observers: RwLock::new(Vec::new()),
            latest: RwLock::new(None),
            next_layer_id: AtomicU64::new(1),
            next_counter_id: AtomicU64::new(1),
            requested: AtomicU64::new(0),
            published: AtomicU64::new(0),
            debouncer,
            jobs,
        });

        let worker = tokio::spawn(run_worker(shared.clone(), views, job_rx));
        tracing::info!(
            "Session started (debounce {} ms, {:?} coordinates)",
            shared.config.debounce_ms,
            shared.config.coordinate_space
        );

        Ok(Self {
            handle: SessionHandle { shared },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the worker
    ///
    /// A viewport still inside its settling window is discarded; one that already settled is
    /// aggregated and published first.
    pub async fn shutdown(mut self) {
        self.handle.shared.debouncer.cancel();
        let _ = self.handle.shared.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            tracing::warn!("Session worker ended abnormally: {}", e);
        }
        tracing::info!("Session stopped");
    }
}

impl std::ops::Deref for MapSession {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SessionHandle {
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // ---- Layers ----

    /// Reserve a fresh layer id
    pub fn next_layer_id(&self) -> LayerId {
        LayerId(self.shared.next_layer_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add a layer, replacing any layer with the same id, and rebuild the index
    pub fn add_layer(&self, layer: Layer) -> LayerId {
        let id = layer.id();
        self.shared
            .next_layer_id
            .fetch_max(id.0 + 1, Ordering::SeqCst);
        if layer.coordinate_space() != self.shared.config.coordinate_space {
            tracing::warn!(
                "Layer '{}' is in {:?} coordinates but the session uses {:?}",
                layer.name(),
                layer.coordinate_space(),
                self.shared.config.coordinate_space
            );
        }

        let name = layer.name().to_string();
        let result = self.shared.update_dataset(|dataset| {
            let mut layers = std::mem::take(&mut dataset.layers);
            match layers.iter().position(|l| l.id() == id) {
                Some(i) => layers[i] = layer,
                None => layers.push(layer),
            }
            *dataset = Dataset::with_layers(layers);
            Ok(dataset.index.len())
        });
        if let Ok(indexed) = result {
            tracing::info!("Added layer '{}' ({}), index holds {} features", name, id, indexed);
        }
        self.shared.invalidate_scales(id);
        self.shared.refresh();
        id
    }

    /// Parse GeoJSON text into a new layer styled with the configured defaults
    pub fn load_geojson(&self, name: &str, geojson: &str) -> Result<LayerId> {
        let layer = loader::load_layer_from_str(self.next_layer_id(), name, geojson)?;
        Ok(self.add_layer(layer.with_style(self.shared.config.default_style()?)))
    }

    /// Load a GeoJSON file into a new layer styled with the configured defaults
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LayerId> {
        let layer = loader::load_layer_from_file(self.next_layer_id(), path)?;
        Ok(self.add_layer(layer.with_style(self.shared.config.default_style()?)))
    }

    /// Remove a layer and rebuild the index
    ///
    /// Counters on the layer stay registered and report empty tables.
    pub fn remove_layer(&self, id: LayerId) -> Result<()> {
        let removed = self.shared.update_dataset(|dataset| {
            let i = dataset.position(id).ok_or(InsightsError::UnknownLayer(id))?;
            let mut layers = std::mem::take(&mut dataset.layers);
            let removed = layers.remove(i);
            *dataset = Dataset::with_layers(layers);
            Ok(removed)
        })?;
        tracing::info!("Removed layer '{}' ({})", removed.name(), id);
        self.shared.invalidate_scales(id);
        self.shared.refresh();
        Ok(())
    }

    /// Copy of one layer (features are shared, not cloned)
    pub fn layer(&self, id: LayerId) -> Option<Layer> {
        let dataset = self.shared.dataset();
        dataset.position(id).map(|i| dataset.layers[i].clone())
    }

    /// Run `f` over the current layers
    pub fn with_layers<R>(&self, f: impl FnOnce(&[Layer]) -> R) -> R {
        f(&self.shared.dataset().layers)
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.with_layers(|layers| layers.iter().map(Layer::id).collect())
    }

    /// Property rows of a layer's first features, up to the configured preview size
    pub fn preview(&self, id: LayerId) -> Result<Vec<Properties>> {
        let layer = self.layer(id).ok_or(InsightsError::UnknownLayer(id))?;
        Ok(layer
            .preview_rows(self.shared.config.preview_rows)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn rename_layer(&self, id: LayerId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.shared.update_dataset(|dataset| {
            let i = dataset.position(id).ok_or(InsightsError::UnknownLayer(id))?;
            dataset.layers[i].set_name(name);
            Ok(())
        })?;
        self.shared.refresh();
        Ok(())
    }

    /// Change a layer's display state
    ///
    /// Does not touch the index. Color scales of the layer are rebuilt on next use when its
    /// color mode changed.
    pub fn update_style(&self, id: LayerId, f: impl FnOnce(&mut LayerStyle)) -> Result<()> {
        let color_changed = self.shared.update_dataset(|dataset| {
            let i = dataset.position(id).ok_or(InsightsError::UnknownLayer(id))?;
            let style = dataset.layers[i].style_mut();
            let before = (style.fill.clone(), style.line.clone());
            f(style);
            style.opacity = style.opacity.clamp(0.0, 1.0);
            Ok(before != (style.fill.clone(), style.line.clone()))
        })?;
        if color_changed {
            self.shared.invalidate_scales(id);
        }
        // Visibility feeds the insights
        self.shared.refresh();
        Ok(())
    }

    pub fn set_visible(&self, id: LayerId, visible: bool) -> Result<()> {
        self.update_style(id, |style| style.visible = visible)
    }

    pub fn set_opacity(&self, id: LayerId, opacity: f32) -> Result<()> {
        self.update_style(id, |style| style.set_opacity(opacity))
    }

    pub fn set_line_width(&self, id: LayerId, width: f32) -> Result<()> {
        self.update_style(id, |style| style.line_width = width.max(0.0))
    }

    /// Use one CSS color for the layer's fill or line
    pub fn set_solid_color(&self, id: LayerId, target: ColorTarget, css: &str) -> Result<()> {
        let color = crate::Rgb::parse(css)?;
        self.update_style(id, |style| style.set_color_mode(target, ColorMode::Solid(color)))
    }

    /// Color the layer's fill or line by an attribute
    ///
    /// Without a scheme, the configured ramp is used for all-numeric attributes and the
    /// configured palette otherwise.
    pub fn set_attribute_color(
        &self,
        id: LayerId,
        target: ColorTarget,
        attribute: &str,
        scheme: Option<&str>,
    ) -> Result<()> {
        let scheme = match scheme {
            Some(scheme) => {
                if crate::color::palettes::get_scheme(scheme).is_none() {
                    return Err(InsightsError::UnknownScheme(scheme.to_string()));
                }
                scheme.to_string()
            }
            None => {
                let layer = self.layer(id).ok_or(InsightsError::UnknownLayer(id))?;
                let values = layer.attribute_values(attribute);
                let numeric =
                    !values.is_empty() && values.iter().all(|v| v.as_number().is_some());
                self.shared.config.default_scheme(numeric).to_string()
            }
        };
        let mode = ColorMode::Attribute {
            attribute: attribute.to_string(),
            scheme,
        };
        self.update_style(id, |style| style.set_color_mode(target, mode))
    }

    /// Scale for the layer's fill or line, or `None` when that color is solid
    ///
    /// Cached per layer and target until the layer's data, attribute or scheme changes.
    pub fn color_scale(&self, id: LayerId, target: ColorTarget) -> Result<Option<Arc<ColorScale>>> {
        let layer = self.layer(id).ok_or(InsightsError::UnknownLayer(id))?;
        let ColorMode::Attribute { attribute, scheme } = layer.style().color_mode(target) else {
            return Ok(None);
        };

        if let Some(cached) = self.shared.scales.get(&(id, target))
            && cached.attribute == *attribute
            && cached.scheme == *scheme
        {
            return Ok(Some(cached.scale.clone()));
        }

        let scale = Arc::new(build_scale(&layer.attribute_values(attribute), scheme)?);
        self.shared.scales.insert(
            (id, target),
            CachedScale {
                attribute: attribute.clone(),
                scheme: scheme.clone(),
                scale: scale.clone(),
            },
        );
        Ok(Some(scale))
    }

    // ---- Counters ----

    /// Register a counter tallying `attribute` over the visible features of a layer
    pub fn add_counter(&self, layer_id: LayerId, attribute: impl Into<String>) -> Result<CounterId> {
        if self.layer(layer_id).is_none() {
            return Err(InsightsError::UnknownLayer(layer_id));
        }
        let id = CounterId(self.shared.next_counter_id.fetch_add(1, Ordering::SeqCst));
        let attribute = attribute.into();
        tracing::debug!("Added {} on {} for '{}'", id, layer_id, attribute);
        self.shared
            .counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AttributeCounter {
                id,
                layer_id,
                attribute,
            });
        self.shared.refresh();
        Ok(id)
    }

    pub fn remove_counter(&self, id: CounterId) -> Result<()> {
        {
            let mut counters = self
                .shared
                .counters
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let i = counters
                .iter()
                .position(|c| c.id == id)
                .ok_or(InsightsError::UnknownCounter(id))?;
            counters.remove(i);
        }
        tracing::debug!("Removed {}", id);
        self.shared.refresh();
        Ok(())
    }

    pub fn counters(&self) -> Vec<AttributeCounter> {
        self.shared
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ---- Viewport events ----

    /// Feed a camera state; aggregation follows once events settle
    ///
    /// # Errors
    /// An invalid view state is logged and skipped; the previous snapshot stays current.
    pub fn update_view(&self, view: &ViewState) -> Result<()> {
        let rect = viewport::viewport_to_bounds_in(view, self.shared.config.coordinate_space)
            .inspect_err(|e| tracing::warn!("Skipping view update: {}", e))?;
        self.update_rect(rect)
    }

    /// Feed raw projection output, nested `[[x, y], [x, y]]` or flat `[x, y, x, y]`
    ///
    /// # Errors
    /// Any other shape is logged and skipped; the previous snapshot stays current.
    pub fn update_bounds(&self, raw: &serde_json::Value) -> Result<()> {
        let rect = ProjectedBounds::from_json(raw)
            .and_then(|bounds| bounds.normalize())
            .inspect_err(|e| tracing::warn!("Skipping bounds update: {}", e))?;
        self.update_rect(rect)
    }

    /// Feed a viewport rectangle directly
    ///
    /// # Errors
    /// Returns [`InsightsError::SessionClosed`] once the session has shut down.
    pub fn update_rect(&self, rect: BoundingBox) -> Result<()> {
        if self.shared.jobs.is_closed() {
            return Err(InsightsError::SessionClosed);
        }
        let generation = self.shared.requested.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Viewport request {}: {:?}", generation, rect.to_array());
        self.shared
            .debouncer
            .schedule(ViewRequest { generation, rect });
        Ok(())
    }

    /// Recompute against the current viewport without waiting for a view event
    pub fn refresh(&self) -> Result<()> {
        self.shared
            .jobs
            .send(Job::Refresh)
            .map_err(|_| InsightsError::SessionClosed)
    }

    // ---- Output ----

    pub fn subscribe(&self, observer: Arc<dyn SnapshotObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.shared
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a viewport is waiting for its settling window
    pub fn is_pending(&self) -> bool {
        self.shared.debouncer.is_pending()
    }
}

/// Serial pipeline: settle the viewport, aggregate on the blocking pool, publish
async fn run_worker(
    shared: Arc<Shared>,
    mut views: mpsc::UnboundedReceiver<ViewRequest>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    let mut settled: Option<ViewRequest> = None;

    loop {
        tokio::select! {
            // Settled viewports first, so shutdown never overtakes one already delivered
            biased;
            view = views.recv() => match view {
                Some(view) => settled = Some(view),
                None => break,
            },
            job = jobs.recv() => match job {
                Some(Job::Refresh) => {}
                Some(Job::Shutdown) | None => break,
            },
        }

        let Some(view) = settled else {
            continue;
        };
        if shared.requested.load(Ordering::SeqCst) != view.generation {
            // A newer viewport is still settling and will trigger its own pass
            continue;
        }

        let dataset = shared.dataset();
        let counters = shared
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let pass = tokio::task::spawn_blocking(move || {
            let visible = aggregate::visible_features(&dataset.index, &view.rect);
            let result =
                aggregate::aggregate_visible(view.rect, &visible, &dataset.layers, &counters);
            let insights = aggregate::compute_insights(&visible, &dataset.layers);
            (result, insights)
        })
        .await;

        let (result, insights) = match pass {
            Ok(pass) => pass,
            Err(e) => {
                tracing::warn!("Aggregation pass failed: {}", e);
                continue;
            }
        };

        if shared.requested.load(Ordering::SeqCst) != view.generation {
            tracing::debug!("Discarding result for stale viewport {}", view.generation);
            continue;
        }
        shared.publish(result, insights);
    }

    tracing::debug!("Session worker exiting");
}
