//! Command implementations
//!
//! Every command loads the stored state, applies one change and writes back only
//! the keys it touched. Human-readable output goes to `out`; diagnostics go
//! through `tracing`.

use crate::app::layers::JsonLayerAdapter;
use crate::app::settings::{
    AddArgs, CategoryCommand, ClusterArgs, Command, MeasureArgs, ReplayArgs,
};
use crate::app::state::MapState;
use crate::app::storage::StorageBackend;
use crate::app::{AppError, AppResult};
use chrono::Utc;
use geo::Point;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use svampkarta_lib::feed::position_feed;
use svampkarta_lib::utils::{format_distance, haversine_distance, is_valid_position};
use svampkarta_lib::{
    Backup, CarLocation, ClusterConfig, Indicator, Marker, MarkerFilter, MeasureRoute,
    MovementTracker, NavigationTarget, NewMarker, PositionSample, SvampError, TrackerConfig,
    TrackerUpdate, WebMercatorProjector, by_distance, cluster_markers, navigate,
    render_instructions,
};

/// View center when there is nothing to center on (middle of Sweden)
const DEFAULT_CENTER: (f64, f64) = (62.0, 15.0);

pub async fn execute(
    command: Command,
    backend: &dyn StorageBackend,
    out: &mut dyn Write,
) -> AppResult<()> {
    #[cfg(feature = "profiling")]
    profiling::scope!("execute");

    let mut state = MapState::load(backend)?;
    match command {
        Command::Add(args) => add(&mut state, backend, args, out),
        Command::Remove { id } => {
            let removed = state.markers.remove(id)?;
            state.save_markers(backend)?;
            writeln!(out, "Removed find {} '{}'", removed.id, removed.name)?;
            Ok(())
        }
        Command::List { category, from } => list(&state, category.as_deref(), from, out),
        Command::Navigate { from, to, car } => {
            let target = match to {
                Some(id) if !car => NavigationTarget::Marker(id),
                _ => NavigationTarget::Car,
            };
            let nav = navigate(
                Point::new(from.1, from.0),
                target,
                &state.markers,
                state.car_location.as_ref(),
            )?;
            writeln!(
                out,
                "{}: {} away, bearing {:.0}° ({}), at {:.6}, {:.6}",
                nav.name,
                format_distance(nav.distance_m),
                nav.bearing,
                nav.compass(),
                nav.target.y(),
                nav.target.x()
            )?;
            Ok(())
        }
        Command::Cluster(args) => cluster(&state, args, out),
        Command::Replay(args) => replay(args, out).await,
        Command::Measure(args) => measure(args, out),
        Command::Export { output } => export(&state, output, out),
        Command::Import { file } => {
            let text = fs::read_to_string(&file)?;
            let summary = Backup::parse(&text)?.apply(
                &mut state.markers,
                &mut state.categories,
                &mut state.car_location,
            );
            state.save_all(backend)?;
            writeln!(
                out,
                "Backup merged: {} new of {} finds ({} unreadable entries), {} categories{}",
                summary.added,
                summary.in_backup,
                summary.skipped,
                summary.categories_merged,
                if summary.car_restored {
                    ", car location restored"
                } else {
                    ""
                }
            )?;
            Ok(())
        }
        Command::Park { lat, lng } => {
            let car = CarLocation { lat, lng };
            if !is_valid_position(&car.position()) {
                return Err(AppError::InvalidInput(format!(
                    "not a valid position: {}, {}",
                    lat, lng
                )));
            }
            state.car_location = Some(car);
            state.save_car_location(backend)?;
            writeln!(out, "Car parked at {:.6}, {:.6}", lat, lng)?;
            Ok(())
        }
        Command::Unpark => {
            if state.car_location.take().is_none() {
                writeln!(out, "No car was parked")?;
                return Ok(());
            }
            state.save_car_location(backend)?;
            writeln!(out, "Car location cleared")?;
            Ok(())
        }
        Command::Categories { action } => categories(&mut state, backend, action, out),
    }
}

fn add(
    state: &mut MapState,
    backend: &dyn StorageBackend,
    args: AddArgs,
    out: &mut dyn Write,
) -> AppResult<()> {
    if !is_valid_position(&Point::new(args.lng, args.lat)) {
        return Err(AppError::InvalidInput(format!(
            "not a valid position: {}, {}",
            args.lat, args.lng
        )));
    }
    if !state.categories.contains(&args.category) {
        return Err(SvampError::UnknownCategory(args.category).into());
    }

    let mut new = NewMarker::new(args.name, args.lat, args.lng);
    new.category = args.category;
    new.abundance = args.abundance;
    new.notes = args.notes;
    new.date = args
        .date
        .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());

    let (id, name) = {
        let marker = state.markers.add(new);
        (marker.id, marker.name.clone())
    };
    state.save_markers(backend)?;
    writeln!(out, "Added find {} '{}'", id, name)?;
    Ok(())
}

fn abundance_dots(marker: &Marker) -> String {
    marker
        .abundance_dots()
        .iter()
        .map(|&filled| if filled { '●' } else { '○' })
        .collect()
}

fn list(
    state: &MapState,
    category: Option<&str>,
    from: Option<(f64, f64)>,
    out: &mut dyn Write,
) -> AppResult<()> {
    let markers: Vec<&Marker> = match category {
        Some(id) => MarkerFilter::with_categories([id]).apply(state.markers.markers()),
        None => state.markers.markers().iter().collect(),
    };
    let ranked: Vec<(&Marker, Option<f64>)> = match from {
        Some((lat, lng)) => {
            let here = Point::new(lng, lat);
            if !is_valid_position(&here) {
                return Err(SvampError::InvalidPosition { lat, lng }.into());
            }
            by_distance(here, markers.iter().copied())
                .into_iter()
                .map(|(marker, d)| (marker, Some(d)))
                .collect()
        }
        None => markers.iter().map(|&marker| (marker, None)).collect(),
    };
    for (marker, distance) in &ranked {
        let category = state.categories.resolve(&marker.category);
        write!(
            out,
            "{}\t{} {}\t{:.5}, {:.5}\t{}\t{}",
            marker.id,
            category.emoji,
            marker.name,
            marker.lat,
            marker.lng,
            marker.date,
            abundance_dots(marker)
        )?;
        if let Some(distance) = distance {
            write!(out, "\t{} away", format_distance(*distance))?;
        }
        if let Some(car) = &state.car_location {
            let distance = haversine_distance(car.position(), marker.position());
            write!(out, "\t{} from car", format_distance(distance))?;
        }
        writeln!(out)?;
    }
    writeln!(out, "{} finds", ranked.len())?;
    Ok(())
}

fn read_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> AppResult<T> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(T::default()),
    }
}

fn cluster(state: &MapState, args: ClusterArgs, out: &mut dyn Write) -> AppResult<()> {
    let config: ClusterConfig = read_config(args.config.as_deref())?;
    let filter = MarkerFilter {
        visible_categories: (!args.categories.is_empty())
            .then(|| args.categories.iter().cloned().collect::<HashSet<_>>()),
        selected: args.selected,
        walking_target: args.walking_to,
    };
    let visible = filter.apply(state.markers.markers());

    let center = match (args.center_lat, args.center_lng) {
        (Some(lat), Some(lng)) => Point::new(lng, lat),
        _ if visible.is_empty() => Point::new(DEFAULT_CENTER.1, DEFAULT_CENTER.0),
        _ => {
            let count = visible.len() as f64;
            Point::new(
                visible.iter().map(|m| m.lng).sum::<f64>() / count,
                visible.iter().map(|m| m.lat).sum::<f64>() / count,
            )
        }
    };
    let projector = WebMercatorProjector::new(
        args.zoom,
        center,
        f64::from(args.width),
        f64::from(args.height),
    );

    let pass = cluster_markers(&visible, args.zoom, &projector, &config);
    tracing::info!(
        "{} visible finds at zoom {} -> {} layers, {} clusters",
        visible.len(),
        args.zoom,
        pass.instructions.len(),
        pass.cluster_count()
    );
    let layers = render_instructions(
        &pass,
        &state.categories,
        args.zoom,
        &config,
        JsonLayerAdapter::new(),
    );
    serde_json::to_writer_pretty(&mut *out, &layers)?;
    writeln!(out)?;
    Ok(())
}

fn describe(update: &TrackerUpdate, streak: u32) -> String {
    let distance = update
        .distance_m
        .map_or_else(|| "-".to_string(), |d| format!("{:.2}m", d));
    let indicator = match update.indicator {
        Indicator::Arrow { heading } => format!("arrow {:.1}°", heading),
        Indicator::Dot => "dot".to_string(),
    };
    let status = if update.ignored {
        "ignored"
    } else if update.confirmed {
        "moving"
    } else if update.detected {
        "detected"
    } else {
        "still"
    };
    format!(
        "{:>8} ms  {:>9}  {:<8}  streak {}  {}",
        update.timestamp, distance, status, streak, indicator
    )
}

async fn replay(args: ReplayArgs, out: &mut dyn Write) -> AppResult<()> {
    let config: TrackerConfig = read_config(args.config.as_deref())?;
    let route = MeasureRoute::read_gpx(BufReader::new(fs::File::open(&args.file)?))?;

    let (publisher, mut subscription) = position_feed();
    for (i, point) in route.points().iter().enumerate() {
        let mut sample = PositionSample::new(i as u64 * args.interval_ms, point.y(), point.x());
        sample.speed = args.speed;
        publisher.publish(sample);
    }
    drop(publisher);

    let mut events: Vec<(u64, bool)> = args
        .interaction
        .iter()
        .flat_map(|&(start, end)| [(start, true), (end, false)])
        .collect();
    events.sort_by_key(|&(at, _)| at);
    let mut events = events.into_iter().peekable();

    let mut tracker = MovementTracker::new(config);
    let (mut fixes, mut moving, mut arrows) = (0usize, 0usize, 0usize);
    while let Some(sample) = subscription.next().await {
        while let Some((at, begin)) = events.next_if(|&(at, _)| at <= sample.timestamp) {
            if begin {
                tracker.begin_interaction(at);
            } else {
                tracker.end_interaction(at);
            }
        }
        let update = tracker.process(&sample);
        fixes += 1;
        moving += usize::from(update.confirmed);
        arrows += usize::from(matches!(update.indicator, Indicator::Arrow { .. }));
        writeln!(out, "{}", describe(&update, tracker.state().streak))?;
    }

    writeln!(
        out,
        "{}: {} fixes over {}, movement confirmed on {}, arrow shown on {}",
        route.name,
        fixes,
        format_distance(route.total_distance_m()),
        moving,
        arrows
    )?;
    Ok(())
}

fn measure(args: MeasureArgs, out: &mut dyn Write) -> AppResult<()> {
    let mut route = match &args.import {
        Some(path) => MeasureRoute::read_gpx(BufReader::new(fs::File::open(path)?))?,
        None => {
            let mut route = MeasureRoute::default();
            for &(lat, lng) in &args.points {
                if !is_valid_position(&Point::new(lng, lat)) {
                    return Err(AppError::InvalidInput(format!(
                        "not a valid position: {}, {}",
                        lat, lng
                    )));
                }
                route.add_point(lat, lng);
            }
            route
        }
    };
    if let Some(name) = args.name {
        route.name = name;
    }

    writeln!(
        out,
        "{}: {} points, {}",
        route.name,
        route.len(),
        format_distance(route.total_distance_m())
    )?;

    if let Some(path) = args.output {
        // A route that cannot be exported leaves no file behind
        let mut gpx = Vec::new();
        route.write_gpx(&mut gpx)?;
        fs::write(&path, gpx)?;
        writeln!(out, "Saved GPX to {}", path.display())?;
    }
    Ok(())
}

fn export(state: &MapState, output: Option<PathBuf>, out: &mut dyn Write) -> AppResult<()> {
    let now = Utc::now();
    let backup = Backup::new(
        &state.markers,
        &state.categories,
        state.car_location,
        now,
    );
    let path = output.unwrap_or_else(|| PathBuf::from(Backup::file_name(now.date_naive())));
    fs::write(&path, backup.to_json_pretty()?)?;
    writeln!(
        out,
        "Exported {} finds to {}",
        backup.markers.len(),
        path.display()
    )?;
    Ok(())
}

fn categories(
    state: &mut MapState,
    backend: &dyn StorageBackend,
    action: CategoryCommand,
    out: &mut dyn Write,
) -> AppResult<()> {
    match action {
        CategoryCommand::List => {
            for category in state.categories.categories() {
                let count = state
                    .markers
                    .markers()
                    .iter()
                    .filter(|m| m.category == category.id)
                    .count();
                writeln!(
                    out,
                    "{}\t{} {}\t{}\t{} finds",
                    category.id,
                    category.emoji,
                    category.name,
                    category.color.name(),
                    count
                )?;
            }
        }
        CategoryCommand::Add { name, emoji } => {
            let id = state.categories.add(&name, &emoji)?.id.clone();
            state.save_categories(backend)?;
            writeln!(out, "Added category '{}'", id)?;
        }
        CategoryCommand::Edit { id, name, emoji } => {
            state.categories.edit(&id, &name, &emoji)?;
            state.save_categories(backend)?;
            writeln!(out, "Updated category '{}'", id)?;
        }
        CategoryCommand::Remove { id } => {
            let (removed, moved) = state.categories.remove(&id, &mut state.markers)?;
            state.save_categories(backend)?;
            state.save_markers(backend)?;
            writeln!(
                out,
                "Removed category '{}', {} finds moved to the general category",
                removed.name, moved
            )?;
        }
        CategoryCommand::Repair => {
            let repaired = state.categories.repair_markers(&mut state.markers);
            if repaired > 0 {
                state.save_markers(backend)?;
            }
            writeln!(out, "{} finds moved to the general category", repaired)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::storage::FileStorage;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        storage: FileStorage,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = FileStorage::new_with_path(Some(dir.path().join("storage.json"))).unwrap();
            Self { dir, storage }
        }

        async fn run(&self, command: Command) -> AppResult<String> {
            let mut out = Vec::new();
            execute(command, &self.storage, &mut out).await?;
            Ok(String::from_utf8(out).unwrap())
        }

        fn state(&self) -> MapState {
            MapState::load(&self.storage).unwrap()
        }

        fn add_args(name: &str, lat: f64, lng: f64, category: &str) -> Command {
            Command::Add(AddArgs {
                name: name.to_string(),
                lat,
                lng,
                category: category.to_string(),
                abundance: 3,
                notes: None,
                date: Some("2025-09-14".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let fx = Fixture::new();
        let added = fx
            .run(Fixture::add_args("Kantarell", 59.3, 18.1, "mushroom"))
            .await
            .unwrap();
        assert_eq!(added, "Added find 1 'Kantarell'\n");

        let listed = fx.run(Command::List {
                category: None,
                from: None,
            }).await.unwrap();
        assert!(listed.contains("🍄‍🟫 Kantarell"));
        assert!(listed.contains("●●●○○"));
        assert!(listed.ends_with("1 finds\n"));

        fx.run(Command::Remove { id: 1 }).await.unwrap();
        assert!(fx.state().markers.is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_unknown_category_and_bad_position() {
        let fx = Fixture::new();
        let result = fx.run(Fixture::add_args("X", 59.0, 18.0, "truffles")).await;
        assert!(matches!(
            result,
            Err(AppError::Svamp(SvampError::UnknownCategory(_)))
        ));
        let result = fx.run(Fixture::add_args("X", 95.0, 18.0, "mushroom")).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(fx.state().markers.is_empty());
    }

    #[tokio::test]
    async fn test_park_list_distance_and_unpark() {
        let fx = Fixture::new();
        fx.run(Fixture::add_args("Karljohan", 59.001, 18.0, "mushroom"))
            .await
            .unwrap();
        fx.run(Command::Park { lat: 59.0, lng: 18.0 }).await.unwrap();
        assert_eq!(
            fx.state().car_location,
            Some(CarLocation { lat: 59.0, lng: 18.0 })
        );

        let listed = fx.run(Command::List {
                category: None,
                from: None,
            }).await.unwrap();
        assert!(listed.contains("111m from car"), "{listed}");

        fx.run(Command::Unpark).await.unwrap();
        assert_eq!(fx.state().car_location, None);
        assert_eq!(fx.run(Command::Unpark).await.unwrap(), "No car was parked\n");
    }

    #[tokio::test]
    async fn test_cluster_prints_layers() {
        let fx = Fixture::new();
        fx.run(Fixture::add_args("A", 59.0, 18.0, "mushroom")).await.unwrap();
        fx.run(Fixture::add_args("B", 59.0, 18.0, "mushroom")).await.unwrap();
        fx.run(Fixture::add_args("C", 59.0, 18.0, "berries")).await.unwrap();

        let output = fx
            .run(Command::Cluster(ClusterArgs {
                zoom: 8.0,
                center_lat: None,
                center_lng: None,
                width: 800,
                height: 600,
                categories: vec!["mushroom".to_string()],
                selected: None,
                walking_to: None,
                config: None,
            }))
            .await
            .unwrap();
        let layers: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(layers.as_array().unwrap().len(), 1);
        assert_eq!(layers[0]["type"], "cluster");
        assert_eq!(layers[0]["members"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_categories_remove_reassigns_finds() {
        let fx = Fixture::new();
        fx.run(Command::Categories {
            action: CategoryCommand::Add {
                name: "Lingon".to_string(),
                emoji: "🔴".to_string(),
            },
        })
        .await
        .unwrap();
        fx.run(Fixture::add_args("Lingonris", 59.0, 18.0, "lingon"))
            .await
            .unwrap();

        let output = fx
            .run(Command::Categories {
                action: CategoryCommand::Remove {
                    id: "lingon".to_string(),
                },
            })
            .await
            .unwrap();
        assert!(output.contains("1 finds moved"));

        let state = fx.state();
        assert!(!state.categories.contains("lingon"));
        assert_eq!(state.markers.get(1).unwrap().category, "unknown");
    }

    #[tokio::test]
    async fn test_export_then_import_into_fresh_storage() {
        let fx = Fixture::new();
        fx.run(Fixture::add_args("Kantarell", 59.3, 18.1, "mushroom"))
            .await
            .unwrap();
        fx.run(Command::Park { lat: 59.0, lng: 18.0 }).await.unwrap();
        let backup_path = fx.dir.path().join("backup.json");
        fx.run(Command::Export {
            output: Some(backup_path.clone()),
        })
        .await
        .unwrap();

        let other = Fixture::new();
        let output = other
            .run(Command::Import {
                file: backup_path.clone(),
            })
            .await
            .unwrap();
        assert!(output.starts_with("Backup merged: 1 new of 1 finds"));
        assert!(output.contains("car location restored"));

        // Importing again adds nothing
        let output = other
            .run(Command::Import { file: backup_path })
            .await
            .unwrap();
        assert!(output.starts_with("Backup merged: 0 new of 1 finds"));
        assert_eq!(other.state().markers.len(), 1);
    }

    #[tokio::test]
    async fn test_measure_save_and_replay() {
        let fx = Fixture::new();
        let gpx_path = fx.dir.path().join("walk.gpx");
        let points: Vec<(f64, f64)> = (0..6).map(|i| (59.0 + i as f64 * 1e-5, 18.0)).collect();

        let output = fx
            .run(Command::Measure(MeasureArgs {
                points,
                name: Some("Kvällspromenad".to_string()),
                import: None,
                output: Some(gpx_path.clone()),
            }))
            .await
            .unwrap();
        assert!(output.starts_with("Kvällspromenad: 6 points, 6m"), "{output}");

        let output = fx
            .run(Command::Replay(ReplayArgs {
                file: gpx_path,
                interval_ms: 1000,
                speed: None,
                interaction: Vec::new(),
                config: None,
            }))
            .await
            .unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("still"));
        assert!(lines[1].contains("detected"));
        assert!(lines[2].contains("moving") && lines[2].contains("arrow"));
        assert!(lines[6].contains("6 fixes"));
        assert!(lines[6].contains("movement confirmed on 4"));
    }

    #[tokio::test]
    async fn test_measure_rejects_single_point_export() {
        let fx = Fixture::new();
        let result = fx
            .run(Command::Measure(MeasureArgs {
                points: vec![(59.0, 18.0)],
                name: None,
                import: None,
                output: Some(fx.dir.path().join("one.gpx")),
            }))
            .await;
        assert!(matches!(
            result,
            Err(AppError::Svamp(SvampError::TooFewPoints { .. }))
        ));
        assert!(!fx.dir.path().join("one.gpx").exists());
    }

    #[tokio::test]
    async fn test_list_from_position_nearest_first() {
        let fx = Fixture::new();
        fx.run(Fixture::add_args("Långt bort", 59.1, 18.0, "mushroom"))
            .await
            .unwrap();
        fx.run(Fixture::add_args("Nära", 59.001, 18.0, "berries"))
            .await
            .unwrap();

        let listed = fx
            .run(Command::List {
                category: None,
                from: Some((59.0, 18.0)),
            })
            .await
            .unwrap();
        let lines: Vec<&str> = listed.lines().collect();
        assert!(lines[0].starts_with("2\t"), "{listed}");
        assert!(lines[0].contains("111m away"), "{listed}");
        assert!(lines[1].starts_with("1\t"), "{listed}");
        assert!(lines[1].contains("11.1km away"), "{listed}");
    }

    #[tokio::test]
    async fn test_navigate_to_find_and_car() {
        let fx = Fixture::new();
        fx.run(Fixture::add_args("Karljohan", 59.001, 18.0, "mushroom"))
            .await
            .unwrap();

        let output = fx
            .run(Command::Navigate {
                from: (59.0, 18.0),
                to: Some(1),
                car: false,
            })
            .await
            .unwrap();
        assert!(output.starts_with("Karljohan: 111m away, bearing 0° (N)"), "{output}");

        let result = fx
            .run(Command::Navigate {
                from: (59.0, 18.0),
                to: None,
                car: true,
            })
            .await;
        assert!(matches!(
            result,
            Err(AppError::Svamp(SvampError::NoCarLocation))
        ));

        fx.run(Command::Park {
            lat: 58.999,
            lng: 18.0,
        })
        .await
        .unwrap();
        let output = fx
            .run(Command::Navigate {
                from: (59.0, 18.0),
                to: None,
                car: true,
            })
            .await
            .unwrap();
        assert!(output.starts_with("Bilen: 111m away, bearing 180° (S)"), "{output}");
    }

    /// Reads as empty and refuses every write
    struct ReadOnlyStorage;

    impl StorageBackend for ReadOnlyStorage {
        fn set_string(&self, _key: &str, _value: &str) -> crate::app::storage::StorageResult<()> {
            Err(crate::app::storage::StorageError::Io("read-only".to_string()))
        }

        fn get_string(&self, _key: &str) -> crate::app::storage::StorageResult<Option<String>> {
            Ok(None)
        }

        fn remove(&self, _key: &str) -> crate::app::storage::StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_reports_nothing_when_save_fails() {
        let mut out = Vec::new();
        let result = execute(
            Fixture::add_args("Kantarell", 59.3, 18.1, "mushroom"),
            &ReadOnlyStorage,
            &mut out,
        )
        .await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(out.is_empty());
    }
}
