use crate::config::load_config;
use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use pagebuilder_selection::{
    AnchorKey, Clock, DetachableTarget, DiagnosticReport, EditorSnapshot, EngineConfig, ManualClock,
    Rect, Resolution, SelectionSession, Size, StabilityStats, TimerKind, Timestamp,
    ToolbarType, ToolbarVisibility,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Trace file: a JSON array of `{ "at": ms, "event": {...} }` steps
    pub trace: PathBuf,

    /// Engine config file (defaults to selection.config.json if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// One recorded input at a point in time
#[derive(Debug, Clone, Deserialize)]
pub struct TraceStep {
    pub at: Timestamp,
    pub event: TraceEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEvent {
    /// Editor store state, fields inline
    Snapshot(EditorSnapshot),
    RegisterAnchor {
        key: String,
        rect: Rect,
    },
    MoveTarget {
        key: String,
        rect: Rect,
    },
    DetachTarget {
        key: String,
    },
    UnregisterAnchor {
        key: String,
    },
    Scroll,
    Resize {
        width: f64,
        height: f64,
    },
    Attach {
        id: String,
        owner: Option<String>,
    },
    Detach {
        id: String,
        owner: Option<String>,
    },
    Unfreeze {
        id: String,
    },
    Query {
        toolbar: ToolbarType,
        width: Option<f64>,
        height: Option<f64>,
    },
    Report,
}

/// What a step produced, if anything worth printing
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepOutput {
    Resolution(Resolution),
    Visibility(ToolbarVisibility),
    #[serde(rename_all = "camelCase")]
    Anchor {
        key: String,
        registered: bool,
    },
    #[serde(rename_all = "camelCase")]
    Attach {
        id: String,
        allowed: bool,
        stats: Option<StabilityStats>,
    },
    #[serde(rename_all = "camelCase")]
    Unfreeze {
        id: String,
        unfrozen: bool,
    },
    Report(Box<DiagnosticReport>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    pub at: Timestamp,

    /// Timers that fired before the event was applied
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fired: Vec<TimerKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
}

/// Drives a session on a manual clock from recorded steps
pub struct Replayer {
    clock: ManualClock,
    session: SelectionSession,
    targets: HashMap<String, DetachableTarget>,
}

impl Replayer {
    pub fn new(config: EngineConfig) -> Self {
        let clock = ManualClock::new(0);
        let session = SelectionSession::with_clock("replay", config, Box::new(clock.clone()));
        Self {
            clock,
            session,
            targets: HashMap::new(),
        }
    }

    pub fn step(&mut self, step: &TraceStep) -> Result<ReplayRecord> {
        if step.at < self.clock.now() {
            return Err(anyhow!(
                "Trace goes back in time: {}ms after {}ms",
                step.at,
                self.clock.now()
            ));
        }
        self.clock.set(step.at);
        let fired = self.session.tick();
        debug!(at = step.at, fired = fired.len(), "Replaying step");

        let output = match &step.event {
            TraceEvent::Snapshot(snapshot) => {
                Some(StepOutput::Resolution(self.session.update(snapshot)))
            }
            TraceEvent::RegisterAnchor { key, rect } => {
                let anchor_key = parse_key(key)?;
                let target = DetachableTarget::new(*rect);
                self.targets.insert(key.clone(), target.clone());
                let registered = self.session.register_anchor(anchor_key, Box::new(target));
                Some(StepOutput::Anchor {
                    key: key.clone(),
                    registered,
                })
            }
            TraceEvent::MoveTarget { key, rect } => {
                self.target(key)?.set_rect(*rect);
                None
            }
            TraceEvent::DetachTarget { key } => {
                self.target(key)?.detach();
                None
            }
            TraceEvent::UnregisterAnchor { key } => {
                self.session.unregister_anchor(&parse_key(key)?);
                self.targets.remove(key);
                None
            }
            TraceEvent::Scroll => self.session.on_scroll().map(StepOutput::Visibility),
            TraceEvent::Resize { width, height } => self
                .session
                .on_resize(Size::new(*width, *height))
                .map(StepOutput::Visibility),
            TraceEvent::Attach { id, owner } => {
                let allowed = self.session.attempt_attach(id, owner.as_deref());
                Some(StepOutput::Attach {
                    id: id.clone(),
                    allowed,
                    stats: self.session.stability_stats(id),
                })
            }
            TraceEvent::Detach { id, owner } => {
                self.session.attempt_detach(id, owner.as_deref());
                None
            }
            TraceEvent::Unfreeze { id } => Some(StepOutput::Unfreeze {
                id: id.clone(),
                unfrozen: self.session.manual_unfreeze(id),
            }),
            TraceEvent::Query {
                toolbar,
                width,
                height,
            } => {
                let size = match (width, height) {
                    (Some(w), Some(h)) => Some(Size::new(*w, *h)),
                    _ => None,
                };
                Some(StepOutput::Visibility(
                    self.session.toolbar_visibility(*toolbar, size),
                ))
            }
            TraceEvent::Report => Some(StepOutput::Report(Box::new(
                self.session.diagnostic_report(),
            ))),
        };

        Ok(ReplayRecord {
            at: step.at,
            fired,
            output,
        })
    }

    /// Target of a registered anchor; targets whose anchor was evicted are dropped
    fn target(&mut self, key: &str) -> Result<&DetachableTarget> {
        if !self.session.anchors().contains(&parse_key(key)?) {
            self.targets.remove(key);
        }
        self.targets
            .get(key)
            .ok_or_else(|| anyhow!("No anchor registered for '{}'", key))
    }

    /// Let remaining one-shot timers fire after the last step
    ///
    /// The anchor sweep repeats for as long as anchors are live, so it alone
    /// does not keep the drain going.
    pub fn drain(&mut self) -> Vec<ReplayRecord> {
        let mut records = Vec::new();
        loop {
            let pending = self.session.pending_timers();
            if pending.iter().all(|(_, kind)| *kind == TimerKind::AnchorSweep) {
                break;
            }
            let Some((deadline, _)) = pending.first() else {
                break;
            };
            let deadline = *deadline;
            self.clock.set(deadline.max(self.clock.now()));
            let fired = self.session.tick();
            if fired.is_empty() {
                break;
            }
            records.push(ReplayRecord {
                at: deadline,
                fired,
                output: None,
            });
        }
        records
    }
}

fn parse_key(key: &str) -> Result<AnchorKey> {
    key.parse::<AnchorKey>()
        .with_context(|| format!("Invalid anchor key in trace: {}", key))
}

pub fn parse_trace(json: &str) -> Result<Vec<TraceStep>> {
    serde_json::from_str(json).context("Trace is not a JSON array of steps")
}

/// Run a whole trace; timers pending at the end are fired in order
pub fn run_trace(steps: &[TraceStep], config: EngineConfig) -> Result<Vec<ReplayRecord>> {
    let mut replayer = Replayer::new(config);
    let mut records = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let record = replayer
            .step(step)
            .with_context(|| format!("Step {} failed", index + 1))?;
        records.push(record);
    }

    records.extend(replayer.drain());
    Ok(records)
}

pub fn replay(args: ReplayArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd, args.config.as_deref())?;
    let content = fs::read_to_string(&args.trace)
        .with_context(|| format!("Cannot read trace {}", args.trace.display()))?;
    let steps = parse_trace(&content)?;
    let records = run_trace(&steps, config)?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Text => {
            println!(
                "{}",
                format!("▶ Replaying {} steps", steps.len()).bright_blue().bold()
            );
            for record in &records {
                print_record(record);
            }
        }
    }

    Ok(())
}

fn print_record(record: &ReplayRecord) {
    let at = format!("{:>7}ms", record.at).dimmed();

    for kind in &record.fired {
        let label = match kind {
            TimerKind::LockExpiry => "lock expired".to_string(),
            TimerKind::StabilityRetry(id) => format!("retry for {}", id),
            TimerKind::AnchorSweep => "anchor sweep".to_string(),
        };
        println!("{} {} {}", at, "⏱".yellow(), label.dimmed());
    }

    let Some(output) = &record.output else {
        return;
    };

    match output {
        StepOutput::Resolution(resolution) => {
            let active = toolbar_label(resolution.active_toolbar);
            let lock = match &resolution.lock.lock_reason {
                Some(reason) => format!(" 🔒 {}", reason).yellow().to_string(),
                None => String::new(),
            };
            println!("{} {} active={}{}", at, "◆".cyan(), active.bold(), lock);
        }
        StepOutput::Visibility(visibility) => {
            let mark = if visibility.is_visible && visibility.position.is_some() {
                "✓".green()
            } else if visibility.is_visible {
                "!".yellow()
            } else {
                "✗".red()
            };
            let position = match &visibility.position {
                Some(p) => format!(
                    " at ({:.0}, {:.0}) {}",
                    p.x,
                    p.y,
                    serde_json::to_string(&p.placement)
                        .unwrap_or_default()
                        .trim_matches('"')
                ),
                None => String::new(),
            };
            println!("{} {} {}{}", at, mark, visibility.reason, position);
        }
        StepOutput::Anchor { key, registered } => {
            let mark = if *registered { "+".green() } else { "✗".red() };
            println!("{} {} anchor {}", at, mark, key);
        }
        StepOutput::Attach { id, allowed, stats } => {
            let frozen = stats.as_ref().is_some_and(|s| s.is_frozen);
            let verdict = match (allowed, frozen) {
                (true, _) => "allowed".green(),
                (false, true) => "blocked (frozen)".red(),
                (false, false) => "blocked".red(),
            };
            println!("{} {} attach {} {}", at, "⚓".blue(), id, verdict);
        }
        StepOutput::Unfreeze { id, unfrozen } => {
            println!("{} {} unfreeze {} → {}", at, "⚓".blue(), id, unfrozen);
        }
        StepOutput::Report(report) => {
            println!("{} {} {}", at, "📋".normal(), report.anchors.summary);
            for factor in &report.verdict.blocking_factors {
                println!("           {} {}", "•".red(), factor);
            }
            for recommendation in &report.anchors.recommendations {
                println!("           {} {}", "→".yellow(), recommendation);
            }
        }
    }
}

fn toolbar_label(toolbar: Option<ToolbarType>) -> String {
    toolbar.map_or_else(|| "none".to_string(), |t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERO_TRACE: &str = r#"[
        { "at": 0, "event": { "type": "registerAnchor", "key": "element:hero.headline",
                              "rect": { "left": 100, "top": 100, "width": 400, "height": 60 } } },
        { "at": 0, "event": { "type": "snapshot",
                              "selectedElement": { "sectionId": "hero", "elementKey": "headline" },
                              "selectedSection": "hero" } },
        { "at": 20, "event": { "type": "query", "toolbar": "section" } },
        { "at": 30, "event": { "type": "query", "toolbar": "element" } },
        { "at": 40, "event": { "type": "detachTarget", "key": "element:hero.headline" } },
        { "at": 50, "event": { "type": "query", "toolbar": "element" } }
    ]"#;

    fn visibility(record: &ReplayRecord) -> &ToolbarVisibility {
        match &record.output {
            Some(StepOutput::Visibility(v)) => v,
            other => panic!("expected visibility, got {:?}", other),
        }
    }

    #[test]
    fn test_replays_hero_trace() {
        let steps = parse_trace(HERO_TRACE).unwrap();
        let records = run_trace(&steps, EngineConfig::default()).unwrap();

        assert!(!visibility(&records[2]).is_visible);

        let element = visibility(&records[3]);
        assert!(element.is_visible);
        assert_eq!(element.position.map(|p| (p.x, p.y)), Some((100.0, 168.0)));

        let detached = visibility(&records[5]);
        assert!(detached.position.is_none());

        // Pending lock expiry fires after the last step.
        assert!(records[6..]
            .iter()
            .any(|r| r.fired.contains(&TimerKind::LockExpiry)));
    }

    #[test]
    fn test_attach_burst_freezes() {
        let steps: Vec<TraceStep> = (0..12)
            .map(|i| TraceStep {
                at: i * 5,
                event: TraceEvent::Attach {
                    id: "canvas".to_string(),
                    owner: None,
                },
            })
            .collect();
        let records = run_trace(&steps, EngineConfig::default()).unwrap();

        let allowed: Vec<bool> = records
            .iter()
            .filter_map(|r| match &r.output {
                Some(StepOutput::Attach { allowed, .. }) => Some(*allowed),
                _ => None,
            })
            .collect();
        assert_eq!(allowed.iter().filter(|a| !**a).count(), 2);
        assert!(records
            .iter()
            .any(|r| r.fired.contains(&TimerKind::StabilityRetry("canvas".to_string()))));
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let steps = parse_trace(
            r#"[{ "at": 0, "event": { "type": "moveTarget", "key": "section:faq",
                 "rect": { "left": 0, "top": 0, "width": 1, "height": 1 } } }]"#,
        )
        .unwrap();
        let err = run_trace(&steps, EngineConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("section:faq"));
    }

    #[test]
    fn test_evicted_anchor_target_cannot_be_moved() {
        let steps = parse_trace(
            r#"[{ "at": 0, "event": { "type": "registerAnchor", "key": "section:faq",
                 "rect": { "left": 0, "top": 0, "width": 100, "height": 40 } } },
                { "at": 10, "event": { "type": "detachTarget", "key": "section:faq" } },
                { "at": 200, "event": { "type": "moveTarget", "key": "section:faq",
                 "rect": { "left": 0, "top": 50, "width": 100, "height": 40 } } }]"#,
        )
        .unwrap();

        let err = run_trace(&steps, EngineConfig::default()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Step 3"), "{message}");
        assert!(message.contains("section:faq"), "{message}");
    }

    #[test]
    fn test_live_anchors_do_not_stall_the_drain() {
        let steps = parse_trace(
            r#"[{ "at": 0, "event": { "type": "registerAnchor", "key": "section:faq",
                 "rect": { "left": 0, "top": 0, "width": 100, "height": 40 } } },
                { "at": 0, "event": { "type": "snapshot", "selectedSection": "faq" } }]"#,
        )
        .unwrap();

        let records = run_trace(&steps, EngineConfig::default()).unwrap();
        let last = records.last().unwrap();
        assert!(last.fired.contains(&TimerKind::LockExpiry));
        assert_eq!(last.at, 350);
    }

    #[test]
    fn test_time_must_not_go_backwards() {
        let steps = parse_trace(
            r#"[{ "at": 100, "event": { "type": "scroll" } },
                { "at": 50, "event": { "type": "scroll" } }]"#,
        )
        .unwrap();
        assert!(run_trace(&steps, EngineConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_unknown_event_type() {
        assert!(parse_trace(r#"[{ "at": 0, "event": { "type": "teleport" } }]"#).is_err());
    }
}
