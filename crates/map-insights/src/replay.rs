//! Event replay
//!
//! Each input line is one JSON object: either a view state
//! (`{"longitude": .., "latitude": .., "zoom": .., "width": .., "height": ..}` plus optional
//! `pitch`/`bearing`) or raw projection output (`{"bounds": [[x, y], [x, y]]}`). An optional
//! `at_ms` field places the event on the replay timeline when running in realtime.

use crate::settings::Settings;
use map_insights_lib::{
    ColorTarget, InsightsError, LayerId, MapSession, ScaleKind, SessionHandle, Snapshot, ViewState,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Insights(#[from] InsightsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write snapshot: {0}")]
    Output(#[from] serde_json::Error),
}

/// One line of the event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventLine {
    /// Offset from the start of the replay
    #[serde(default)]
    pub at_ms: Option<u64>,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Bounds { bounds: serde_json::Value },
    View(ViewState),
}

/// Counts of what happened during a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub rejected: usize,
}

pub fn parse_event(line: &str) -> serde_json::Result<EventLine> {
    serde_json::from_str(line)
}

/// Load layers, register counters, replay events and print every snapshot as a JSON line
pub async fn run(settings: Settings) -> Result<(), ReplayError> {
    let session = MapSession::start(settings.to_config())?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();
    session.subscribe(Arc::new(move |snapshot: &Snapshot| {
        // Printer gone means output failed; the error surfaces from its task
        let _ = tx.send(snapshot.clone());
    }));
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(snapshot) = rx.recv().await {
            let mut line = serde_json::to_vec(&snapshot)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
        }
        stdout.flush().await?;
        Ok::<_, ReplayError>(())
    });

    let mut layers = Vec::new();
    for path in &settings.files {
        let id = session.load_file(path)?;
        log_layer_summary(&session, id);
        layers.push(id);
    }
    register_counters(&session, &layers, &settings.counters, settings.print_scales)?;

    let stats = match settings.events_path() {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            replay_events(&session, BufReader::new(file), settings.realtime).await?
        }
        None => {
            let stdin = tokio::io::stdin();
            replay_events(&session, BufReader::new(stdin), settings.realtime).await?
        }
    };
    tracing::info!(
        "Replayed {} events ({} rejected)",
        stats.events,
        stats.rejected
    );

    wait_settled(&session).await;
    session.shutdown().await;

    match printer.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e).into()),
    }
}

/// Feed every event line to the session
///
/// Unparsable lines and rejected viewports are logged and skipped.
pub async fn replay_events<R>(
    session: &SessionHandle,
    reader: R,
    realtime: bool,
) -> Result<ReplayStats, ReplayError>
where
    R: AsyncBufRead + Unpin,
{
    let start = Instant::now();
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = match parse_event(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Skipping event line {}: {}", line_number, e);
                stats.rejected += 1;
                continue;
            }
        };

        if realtime && let Some(at_ms) = event.at_ms {
            tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
        }

        profiling::scope!("replay::event");
        stats.events += 1;
        let accepted = match &event.event {
            Event::Bounds { bounds } => session.update_bounds(bounds),
            Event::View(view) => session.update_view(view),
        };
        if accepted.is_err() {
            stats.rejected += 1;
        }
    }

    Ok(stats)
}

/// Wait until no viewport is inside its settling window
pub async fn wait_settled(session: &SessionHandle) {
    while session.is_pending() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn log_layer_summary(session: &SessionHandle, id: LayerId) {
    let Some(layer) = session.layer(id) else {
        return;
    };
    let kinds: Vec<&str> = layer.geometry_kinds().iter().map(|k| k.name()).collect();
    let attributes: Vec<String> = layer
        .attribute_types()
        .into_iter()
        .map(|(name, kind)| format!("{name}: {kind:?}"))
        .collect();
    tracing::info!(
        "{} '{}': {} features [{}], attributes {{{}}}",
        id,
        layer.name(),
        layer.len(),
        kinds.join(", "),
        attributes.join(", ")
    );
}

fn register_counters(
    session: &SessionHandle,
    layers: &[LayerId],
    attributes: &[String],
    print_scales: bool,
) -> Result<(), ReplayError> {
    for attribute in attributes {
        let mut registered = 0;
        for &id in layers {
            let has_attribute = session
                .layer(id)
                .is_some_and(|layer| layer.has_attribute(attribute));
            if !has_attribute {
                continue;
            }
            session.add_counter(id, attribute.as_str())?;
            registered += 1;

            if print_scales {
                session.set_attribute_color(id, ColorTarget::Fill, attribute, None)?;
                if let Some(scale) = session.color_scale(id, ColorTarget::Fill)? {
                    match scale.kind() {
                        ScaleKind::Continuous { min, max } => tracing::info!(
                            "{} '{}': {} over [{}, {}]",
                            id,
                            attribute,
                            scale.scheme(),
                            min,
                            max
                        ),
                        ScaleKind::Categorical => {
                            let entries: Vec<String> = scale
                                .categories()
                                .map(|(key, color)| format!("{key}={color}"))
                                .collect();
                            tracing::info!(
                                "{} '{}': {} {{{}}}",
                                id,
                                attribute,
                                scale.scheme(),
                                entries.join(", ")
                            );
                        }
                    }
                }
            }
        }
        if registered == 0 {
            tracing::warn!("No loaded layer has attribute '{}'", attribute);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use map_insights_lib::Config;
    use std::sync::Mutex;

    const LAYER: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 1]}, "properties": {"status": "open"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [2, 2]}, "properties": {"status": "closed"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [8, 8]}, "properties": {"status": "open"}}
        ]
    }"#;

    #[test]
    fn test_parse_view_event() {
        let line = r#"{"longitude": 2.0, "latitude": 41.0, "zoom": 10, "width": 800, "height": 600, "at_ms": 50}"#;
        let event = parse_event(line).unwrap();
        assert_eq!(event.at_ms, Some(50));
        let Event::View(view) = event.event else {
            panic!("expected a view event");
        };
        assert_eq!(view.zoom, 10.0);
        assert_eq!(view.pitch, 0.0);
    }

    #[test]
    fn test_parse_bounds_event() {
        let event = parse_event(r#"{"bounds": [0, 0, 5, 5]}"#).unwrap();
        assert_eq!(event.at_ms, None);
        assert_eq!(
            event.event,
            Event::Bounds {
                bounds: serde_json::json!([0, 0, 5, 5])
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        assert!(parse_event(r#"{"center": [0, 0]}"#).is_err());
        assert!(parse_event("not json").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_replay_publishes_per_burst() {
        let session = MapSession::start(Config::default()).unwrap();
        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::default();
        let sink = seen.clone();
        session.subscribe(Arc::new(move |s: &Snapshot| sink.lock().unwrap().push(s.clone())));

        let layer = session.load_geojson("incidents", LAYER).unwrap();
        let counter = session.add_counter(layer, "status").unwrap();

        let events = concat!(
            "{\"bounds\": [[0, 0], [1.5, 1.5]], \"at_ms\": 0}\n",
            "{\"bounds\": [[0, 0], [3, 3]], \"at_ms\": 50}\n",
            "# comment\n",
            "{\"bounds\": {\"bad\": true}, \"at_ms\": 60}\n",
            "garbage\n",
            "{\"bounds\": [0, 0, 10, 10], \"at_ms\": 1000}\n",
        );
        let stats = replay_events(&session, events.as_bytes(), true)
            .await
            .unwrap();
        assert_eq!(stats, ReplayStats { events: 4, rejected: 2 });

        wait_settled(&session).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].result.count_for(layer), Some(2));
        assert_eq!(seen[1].result.count_for(layer), Some(3));
        let table = seen[1].result.counts_for(counter).unwrap();
        assert_eq!(table.get("open"), 2);
        assert_eq!(table.get("closed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_replay_collapses_to_last_event() {
        let session = MapSession::start(Config::default()).unwrap();
        let layer = session.load_geojson("incidents", LAYER).unwrap();

        let events = "{\"bounds\": [0, 0, 1.5, 1.5]}\n{\"bounds\": [0, 0, 10, 10]}\n";
        replay_events(&session, events.as_bytes(), false)
            .await
            .unwrap();
        wait_settled(&session).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let latest = session.latest().unwrap();
        assert_eq!(latest.sequence, 1);
        assert_eq!(latest.result.count_for(layer), Some(3));
    }
}
