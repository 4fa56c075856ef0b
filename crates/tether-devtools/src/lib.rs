use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use web_time::Instant;

use tether_core::{InstanceId, InstanceStats, Lifecycle, Runtime, SlotInfo, SlotKind};

/// Snapshot of one mounted instance: its ledger layout and counters.
#[derive(Clone, Debug, Serialize)]
pub struct InstanceReport {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub slots: Vec<SlotInfo>,
    pub stats: InstanceStats,
}

impl InstanceReport {
    pub fn capture<P: 'static, O: 'static>(rt: &Runtime<P, O>, id: InstanceId) -> Option<Self> {
        let ledger = rt.ledger(id)?;
        Some(Self {
            name: rt.name(id)?.to_string(),
            lifecycle: ledger.lifecycle(),
            slots: ledger.describe(),
            stats: rt.stats(id)?,
        })
    }

    pub fn count(&self, kind: SlotKind) -> usize {
        self.slots.iter().filter(|s| s.kind == kind).count()
    }

    /// One line, HUD style.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("{} ({:?})", self.name, self.lifecycle),
            format!("slots: {}", self.slots.len()),
            format!("renders: {}", self.stats.renders),
        ];
        if self.stats.bailouts > 0 {
            lines.push(format!("skipped: {}", self.stats.bailouts));
        }
        lines.push(format!(
            "effects: {}/{}",
            self.stats.effects_run, self.stats.cleanups_run
        ));
        let pending = self.slots.iter().filter(|s| s.pending_updates).count();
        if pending > 0 {
            lines.push(format!("pending: {pending}"));
        }
        lines.join("  |  ")
    }

    /// One line per slot.
    pub fn table(&self) -> String {
        self.slots
            .iter()
            .map(|s| {
                let mut line = format!("#{:<2} {:<13}", s.index, s.kind.to_string());
                if let Some(deps) = &s.deps {
                    line.push_str(&format!(" deps={deps}"));
                }
                if s.runs > 0 {
                    line.push_str(&format!(" runs={}", s.runs));
                }
                if s.pending_updates {
                    line.push_str(" pending");
                }
                line.trim_end().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Reports for every mounted instance, in mount order.
pub fn inspect<P: 'static, O: 'static>(rt: &Runtime<P, O>) -> Vec<InstanceReport> {
    rt.instances()
        .filter_map(|id| InstanceReport::capture(rt, id))
        .collect()
}

/// Smoothed render duration.
#[derive(Clone, Debug, Default)]
pub struct RenderMeter {
    samples: u64,
    smooth_ms: f32,
    slowest: Duration,
}

impl RenderMeter {
    const ALPHA: f32 = 0.2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f32() * 1000.0;
        // simple EMA
        self.smooth_ms = if self.samples == 0 {
            ms
        } else {
            (1.0 - Self::ALPHA) * self.smooth_ms + Self::ALPHA * ms
        };
        self.samples += 1;
        self.slowest = self.slowest.max(elapsed);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn average_ms(&self) -> f32 {
        self.smooth_ms
    }

    pub fn slowest(&self) -> Duration {
        self.slowest
    }
}

/// Polls a runtime between passes and keeps a rolling view of it.
pub struct Inspector {
    pub enabled: bool,
    pub meter: RenderMeter,
    frame_count: u64,
    last_frame: Option<Instant>,
    frames_per_sec: f32,
    seen_renders: HashMap<InstanceId, u64>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            enabled: true,
            meter: RenderMeter::new(),
            frame_count: 0,
            last_frame: None,
            frames_per_sec: 0.0,
            seen_renders: HashMap::new(),
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Samples the runtime once. Each instance that rendered since the last
    /// frame feeds its latest render time to the meter; the returned reports
    /// are also logged at debug level.
    pub fn frame<P: 'static, O: 'static>(&mut self, rt: &Runtime<P, O>) -> Vec<InstanceReport> {
        if !self.enabled {
            return Vec::new();
        }
        self.frame_count += 1;

        let now = Instant::now();
        if let Some(prev) = self.last_frame.replace(now) {
            let dt = (now - prev).as_secs_f32();
            if dt > 0.0 {
                let fps = 1.0 / dt;
                self.frames_per_sec = if self.frames_per_sec == 0.0 {
                    fps
                } else {
                    0.8 * self.frames_per_sec + 0.2 * fps
                };
            }
        }

        let mut seen = HashMap::with_capacity(self.seen_renders.len());
        let mut reports = Vec::new();
        for id in rt.instances() {
            let Some(report) = InstanceReport::capture(rt, id) else {
                continue;
            };
            let before = self.seen_renders.get(&id).copied().unwrap_or(0);
            if report.stats.renders > before {
                self.meter.record(report.stats.last_render);
            }
            seen.insert(id, report.stats.renders);
            log::debug!("{}", report.summary());
            reports.push(report);
        }
        // Unmounted instances fall out here.
        self.seen_renders = seen;
        reports
    }

    pub fn overlay(&self) -> String {
        [
            format!("frame: {}", self.frame_count),
            format!("fps: {:.1}", self.frames_per_sec),
            format!("render: {:.2} ms", self.meter.average_ms()),
        ]
        .join("  |  ")
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tether_core::*;

    use super::*;

    fn friend_status() -> (Runtime<u32, &'static str>, InstanceId) {
        let mut rt: Runtime<u32, &'static str> = Runtime::new();
        let id = rt
            .mount("friend-status", 100, |hooks, friend_id| {
                let friend_id = *friend_id;
                let (online, set_online) = hooks.use_state(|| None::<bool>)?;
                hooks.use_effect(deps![friend_id], move || {
                    set_online.set(Some(true));
                    cleanup(move || log::trace!("unsubscribe {friend_id}"))
                })?;
                let label = hooks.use_memo(deps![online], move || match online {
                    None => "Loading...",
                    Some(true) => "Online",
                    Some(false) => "Offline",
                })?;
                hooks.use_ref(|| 0u32)?;
                Ok(*label)
            })
            .unwrap();
        (rt, id)
    }

    #[test]
    fn test_summary_after_mount() {
        let (rt, id) = friend_status();
        let report = InstanceReport::capture(&rt, id).unwrap();
        insta::assert_snapshot!(
            report.summary(),
            @"friend-status (Idle)  |  slots: 4  |  renders: 1  |  effects: 0/0"
        );
        assert_eq!(report.count(SlotKind::Effect), 1);
    }

    #[test]
    fn test_table_after_settling() {
        let (mut rt, id) = friend_status();
        rt.run_until_idle().unwrap();
        rt.set_props(id, 200).unwrap();
        rt.run_until_idle().unwrap();

        let report = InstanceReport::capture(&rt, id).unwrap();
        insta::assert_snapshot!(report.table(), @r"
        #0  state
        #1  effect        deps=List([200]) runs=2
        #2  memo          deps=List([Some(true)]) runs=2
        #3  ref
        ");
        insta::assert_snapshot!(
            report.summary(),
            @"friend-status (Idle)  |  slots: 4  |  renders: 3  |  skipped: 1  |  effects: 2/1"
        );
    }

    #[test]
    fn test_json_report() {
        let mut rt: Runtime<(), i32> = Runtime::new();
        let setter = Rc::new(RefCell::new(None));
        let id = rt
            .mount("counter", (), {
                let setter = setter.clone();
                move |hooks, _| {
                    let (count, set_count) = hooks.use_state(|| 0)?;
                    *setter.borrow_mut() = Some(set_count);
                    Ok(count)
                }
            })
            .unwrap();
        if let Some(set_count) = setter.borrow().as_ref() {
            set_count.update(|c| c + 1);
        }

        let report = InstanceReport::capture(&rt, id).unwrap();
        insta::assert_snapshot!(report.to_json().unwrap(), @r#"
        {
          "name": "counter",
          "lifecycle": "Idle",
          "slots": [
            {
              "index": 0,
              "kind": "State",
              "deps": null,
              "runs": 0,
              "pending_updates": true
            }
          ],
          "stats": {
            "renders": 1,
            "bailouts": 0,
            "commits": 1,
            "effects_run": 0,
            "cleanups_run": 0
          }
        }
        "#);
    }

    #[test]
    fn test_inspect_lists_instances_in_mount_order() {
        let mut rt: Runtime = Runtime::new();
        for name in ["a", "b", "c"] {
            rt.mount(name, (), |_, _| Ok(())).unwrap();
        }
        let names: Vec<_> = inspect(&rt).into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_render_meter_smooths() {
        let mut meter = RenderMeter::new();
        meter.record(Duration::from_millis(10));
        assert_eq!(meter.average_ms(), 10.0);
        meter.record(Duration::from_millis(20));
        assert!((meter.average_ms() - 12.0).abs() < 1e-3);
        assert_eq!(meter.slowest(), Duration::from_millis(20));
        assert_eq!(meter.samples(), 2);
    }

    #[test]
    fn test_disabled_inspector_reports_nothing() {
        let (rt, _) = friend_status();
        let mut inspector = Inspector::new();
        inspector.toggle();
        assert!(inspector.frame(&rt).is_empty());
        assert_eq!(inspector.frame_count(), 0);

        inspector.toggle();
        assert_eq!(inspector.frame(&rt).len(), 1);
        assert_eq!(inspector.meter.samples(), 1);
        assert!(inspector.overlay().starts_with("frame: 1  |  fps: "));
    }

    #[test]
    fn test_meter_samples_only_instances_that_rendered() {
        let setter = Rc::new(RefCell::new(None));
        let mut rt: Runtime<(), i32> = Runtime::new();
        let busy = rt
            .mount("busy", (), {
                let setter = setter.clone();
                move |hooks, _| {
                    let (count, set_count) = hooks.use_state(|| 0)?;
                    *setter.borrow_mut() = Some(set_count);
                    Ok(count)
                }
            })
            .unwrap();
        for name in ["quiet-a", "quiet-b"] {
            rt.mount(name, (), |_, _| Ok(0)).unwrap();
        }

        let mut inspector = Inspector::new();
        inspector.frame(&rt);
        assert_eq!(inspector.meter.samples(), 3);

        inspector.frame(&rt);
        assert_eq!(inspector.meter.samples(), 3);

        if let Some(set_count) = setter.borrow().as_ref() {
            set_count.set(1);
        }
        rt.run_until_idle().unwrap();
        assert_eq!(rt.stats(busy).unwrap().renders, 2);
        inspector.frame(&rt);
        assert_eq!(inspector.meter.samples(), 4);
    }
}
