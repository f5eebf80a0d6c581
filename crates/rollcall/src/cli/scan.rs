//! `rollcall scan`: the station's scanning loop.
//!
//! Reads one decoded id per line from stdin and classifies it under the
//! selected (day, purpose). The record store's change feed, the connectivity
//! probe and the sync engine run in the background for the whole session.

use super::config::StationConfig;
use super::error::HelpfulError;
use super::output::tone_label;
use super::station::{open_queue, open_store};
use rollcall_protocol::Day;
use rollcall_station::{
    CacheFeed, Connectivity, ConnectivityProbe, FeedbackBoard, Roster, ScanCache, ScanClassifier,
    ScanContext, ScanOutcome, ScanStore, SessionContext, SyncEngine, SyncTrigger, STATION_METRICS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// How often the store is polled for scans committed by other stations
const CHANGE_FEED_INTERVAL: Duration = Duration::from_secs(1);

/// Arguments for the scan command
#[derive(Debug)]
pub struct ScanArgs {
    pub day: Day,
    pub purpose: Option<String>,
    pub user: Option<String>,
    pub offline: bool,
    pub json: bool,
}

/// Resolve the operator's session and the (day, purpose) they scan for.
fn select_context(args: &ScanArgs, config: &StationConfig) -> anyhow::Result<ScanContext> {
    let user = args.user.clone().or_else(|| config.user.clone());
    let session = SessionContext::new(user, &config.permission_table());
    let purpose = match &args.purpose {
        Some(purpose) => purpose.clone(),
        None => session
            .available_purposes(args.day)
            .first()
            .map(|p| p.to_string())
            .unwrap_or_default(),
    };

    session.select(args.day, &purpose).map_err(|err| {
        let allowed: Vec<(Day, Vec<&str>)> = session
            .available_days()
            .into_iter()
            .map(|day| (day, session.available_purposes(day)))
            .collect();
        HelpfulError::permission_denied(&err, &allowed).into()
    })
}

fn print_outcome(outcome: &ScanOutcome, ctx: &ScanContext, json: bool) -> anyhow::Result<()> {
    let feedback = outcome.feedback();

    if json {
        let delegate_id = match outcome {
            ScanOutcome::Invalid { id } => id.as_str().to_string(),
            other => other
                .delegate()
                .map(|d| d.id.as_str().to_string())
                .unwrap_or_default(),
        };
        let queue_length = match outcome {
            ScanOutcome::Queued { queue_length, .. } => Some(*queue_length),
            _ => None,
        };
        let value = serde_json::json!({
            "outcome": outcome.kind().as_str(),
            "delegate_id": delegate_id,
            "name": outcome.delegate().map(|d| d.name.as_str()),
            "day": ctx.day().number(),
            "purpose": ctx.purpose(),
            "tone": feedback.tone.as_str(),
            "message": feedback.message,
            "detail": feedback.detail,
            "queue_length": queue_length,
        });
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    let detail = feedback
        .detail
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default();
    match outcome.delegate() {
        Some(delegate) if delegate.name != feedback.message => println!(
            "[{}] {} {}: {}{}",
            tone_label(feedback.tone),
            delegate.id,
            delegate.name,
            feedback.message,
            detail
        ),
        _ => println!(
            "[{}] {}{}",
            tone_label(feedback.tone),
            feedback.message,
            detail
        ),
    }
    Ok(())
}

pub async fn run(args: ScanArgs, config: &StationConfig) -> anyhow::Result<()> {
    let ctx = select_context(&args, config)?;

    let store = open_store(config).await?;
    let queue = open_queue(config)?;
    let scan_store: Arc<dyn ScanStore> = store.clone();

    let roster = Roster::load(&*store)
        .await
        .map_err(|e| HelpfulError::store_unavailable(&config.store_url, &e.to_string()))?;
    if roster.is_empty() {
        warn!("Roster is empty; every scan will be rejected");
        if !args.json {
            eprint!("{}", HelpfulError::empty_roster());
        }
    }

    let cache = ScanCache::new();
    let change_feed = (!args.offline).then(|| store.watch_changes(CHANGE_FEED_INTERVAL));
    let cache_feed = CacheFeed::start(cache.clone(), scan_store.clone())
        .await
        .map_err(|e| HelpfulError::store_unavailable(&config.store_url, &e.to_string()))?;

    let connectivity = if args.offline {
        Connectivity::new(false)
    } else {
        Connectivity::new(scan_store.ping().await.is_ok())
    };
    let probe = (!args.offline).then(|| {
        ConnectivityProbe::spawn(
            scan_store.clone(),
            connectivity.clone(),
            config.probe_interval(),
        )
    });

    let trigger = SyncTrigger::new();
    let engine = Arc::new(SyncEngine::new(queue.clone(), scan_store.clone()).with_cache(cache.clone()));
    let sync_handle = engine.spawn(connectivity.clone(), trigger.clone(), config.sync_interval());

    let board = FeedbackBoard::new(config.feedback_reset());
    let classifier = ScanClassifier::new(
        Arc::new(roster),
        cache,
        scan_store,
        queue.clone(),
        connectivity.clone(),
    )
    .with_sync_trigger(trigger)
    .with_feedback(board);

    info!(
        operator = ctx.operator(),
        day = %ctx.day(),
        purpose = ctx.purpose(),
        offline = args.offline,
        queued = queue.len(),
        "Station ready"
    );
    if !args.json {
        eprintln!(
            "Scanning day {} / {} as {}. One id per line, Ctrl-D to finish.",
            ctx.day(),
            ctx.purpose(),
            ctx.operator()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result: anyhow::Result<()> = loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping station");
                break Ok(());
            }
            line = lines.next_line() => line,
        };

        let raw = match line {
            Ok(Some(raw)) => raw,
            Ok(None) => break Ok(()),
            Err(e) => break Err(anyhow::Error::new(e).context("Failed to read scanner input")),
        };
        if raw.trim().is_empty() {
            continue;
        }

        match classifier.classify(&raw, &ctx).await {
            Some(outcome) => {
                if let Err(e) = print_outcome(&outcome, &ctx, args.json) {
                    break Err(e);
                }
            }
            None => debug!("Input dropped while a scan was in flight"),
        }
    };

    // Last chance to push scans queued after a transport failure.
    if connectivity.is_online() && !queue.is_empty() {
        let outcome = engine.sync_now().await;
        debug!(result = outcome.as_str(), "Final sync: {}", outcome.summary());
    }

    sync_handle.shutdown().await;
    if let Some(probe) = probe {
        probe.stop().await;
    }
    cache_feed.stop().await;
    if let Some(feed) = change_feed {
        feed.stop().await;
    }

    let remaining = queue.len();
    if remaining > 0 {
        warn!(remaining, "Scans still queued offline");
        if !args.json {
            eprintln!(
                "{} scan(s) still queued offline. Run `rollcall sync` once the store is reachable.",
                remaining
            );
        }
    }

    let metrics = STATION_METRICS.snapshot();
    info!(
        accepted = metrics.scans_accepted,
        duplicate_local = metrics.scans_duplicate_local,
        duplicate_remote = metrics.scans_duplicate_remote,
        invalid = metrics.scans_invalid,
        queued = metrics.scans_queued,
        failed = metrics.scans_failed,
        synced = metrics.entries_synced,
        "Station session finished"
    );

    store.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(user: Option<&str>, day: Day, purpose: Option<&str>) -> ScanArgs {
        ScanArgs {
            day,
            purpose: purpose.map(str::to_string),
            user: user.map(str::to_string),
            offline: false,
            json: false,
        }
    }

    #[test]
    fn test_default_purpose_is_first_allowed_for_day() {
        let config = StationConfig::default();
        let ctx = select_context(&args(Some("Food"), Day::Two, None), &config).unwrap();
        assert_eq!(ctx.purpose(), "Breakfast");
        assert_eq!(ctx.operator(), "Food");
    }

    #[test]
    fn test_user_falls_back_to_config() {
        let config = StationConfig {
            user: Some("Seargent".to_string()),
            ..StationConfig::default()
        };
        let ctx = select_context(&args(None, Day::Three, Some("Attendance")), &config).unwrap();
        assert_eq!(ctx.operator(), "Seargent");
    }

    #[test]
    fn test_denied_purpose_is_helpful_error() {
        let config = StationConfig::default();
        let err = select_context(&args(Some("Kit"), Day::Two, Some("Kit")), &config).unwrap_err();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert!(helpful.message.contains("Kit may not scan on day 2"));
        assert!(helpful.suggestions.iter().any(|s| s.contains("Day 1: Kit")));
    }

    #[test]
    fn test_missing_operator_is_rejected() {
        let config = StationConfig::default();
        let err = select_context(&args(None, Day::One, Some("Kit")), &config).unwrap_err();
        assert!(err.to_string().contains("No operator"));
    }
}
