use abflow::engine::progress::{Progress, ProgressCallback};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    /// A line printed above the bars, e.g. notices from signal handlers.
    Log(String),
}

/// Draws one bar per stage of a design run on stderr.
///
/// The pipeline runs on a blocking thread and only sends events; this task owns the
/// bars. Item failures arrive as messages and are counted into the phase summary.
pub struct UiManager {
    mp: MultiProgress,
    phase: Option<Phase>,
    events: mpsc::Receiver<UiEvent>,
    shutdown: watch::Receiver<bool>,
    // Keeps the MultiProgress alive between phases so lines printed there stay ordered.
    anchor: ProgressBar,
}

struct Phase {
    name: String,
    bar: ProgressBar,
    started: Instant,
    failures: usize,
}

impl Phase {
    fn summary(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        match self.failures {
            0 => format!("✓ {} ({elapsed:.1}s)", self.name),
            n => format!("✓ {} ({elapsed:.1}s, {n} failed)", self.name),
        }
    }
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, events) = mpsc::channel(1024);
        let (shutdown_sender, shutdown) = watch::channel(false);
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        let anchor = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            phase: None,
            events,
            shutdown,
            anchor,
        };
        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.handle_event(event),
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        if let Some(phase) = self.phase.take() {
            phase.bar.finish_and_clear();
        }
        self.anchor.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(line) => self.print(line),
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn print(&self, line: impl AsRef<str>) {
        if self.mp.println(line).is_err() {
            warn!("Could not write progress output");
        }
    }

    fn start_phase(&mut self, name: String) {
        self.finish_phase();
        let bar = self.mp.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(name.clone());
        self.phase = Some(Phase {
            name,
            bar,
            started: Instant::now(),
            failures: 0,
        });
    }

    fn finish_phase(&mut self) {
        if let Some(phase) = self.phase.take() {
            phase.bar.finish_and_clear();
            self.print(phase.summary());
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => self.start_phase(name),
            Progress::PhaseFinish => self.finish_phase(),
            Progress::TaskStart { total_steps } => {
                if let Some(phase) = &self.phase {
                    phase.bar.disable_steady_tick();
                    phase.bar.set_style(items_style());
                    phase.bar.set_length(total_steps);
                    phase.bar.set_position(0);
                }
            }
            Progress::TaskIncrement { amount } => {
                if let Some(phase) = &self.phase {
                    phase.bar.inc(amount);
                }
            }
            Progress::TaskFinish => {
                if let Some(phase) = &self.phase {
                    phase.bar.finish();
                }
            }
            Progress::StatusUpdate { text } => {
                if let Some(phase) = &self.phase {
                    phase.bar.set_message(format!("{} [{}]", phase.name, text));
                }
            }
            Progress::Message(msg) => {
                if let Some(phase) = &mut self.phase {
                    phase.failures += 1;
                }
                self.print(format!("  ✗ {msg}"));
            }
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn items_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<40} [{bar:30.cyan/blue}] {pos}/{len} items ({elapsed_s})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key(
            "elapsed_s",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{}s", state.elapsed().as_secs());
            },
        )
        .progress_chars("=> ")
}

#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Dropped progress event: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden_manager() -> UiManager {
        let (manager, _, _) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    fn send(manager: &mut UiManager, progress: Progress) {
        manager.handle_event(UiEvent::Progress(progress));
    }

    fn start(manager: &mut UiManager, name: &str) {
        send(manager, Progress::PhaseStart { name: name.into() });
    }

    #[test]
    fn each_phase_gets_its_own_bar() {
        let mut manager = hidden_manager();
        start(&mut manager, "backbone");
        start(&mut manager, "sequence");

        let phase = manager.phase.as_ref().unwrap();
        assert_eq!(phase.name, "sequence");
        assert_eq!(phase.bar.message(), "sequence");
    }

    #[test]
    fn item_counts_drive_the_bar() {
        let mut manager = hidden_manager();
        start(&mut manager, "prediction");
        send(&mut manager, Progress::TaskStart { total_steps: 8 });
        send(&mut manager, Progress::TaskIncrement { amount: 3 });

        let bar = &manager.phase.as_ref().unwrap().bar;
        assert_eq!(bar.length(), Some(8));
        assert_eq!(bar.position(), 3);

        send(&mut manager, Progress::TaskFinish);
        assert!(manager.phase.as_ref().unwrap().bar.is_finished());
    }

    #[test]
    fn status_shows_the_current_item() {
        let mut manager = hidden_manager();
        start(&mut manager, "sequence");
        send(
            &mut manager,
            Progress::StatusUpdate {
                text: "design_3".into(),
            },
        );
        assert_eq!(
            manager.phase.as_ref().unwrap().bar.message(),
            "sequence [design_3]"
        );
    }

    #[test]
    fn failures_are_counted_into_the_summary() {
        let mut manager = hidden_manager();
        start(&mut manager, "backbone");
        send(&mut manager, Progress::Message("design_1 failed: exit 1".into()));
        send(&mut manager, Progress::Message("design_4 failed: exit 1".into()));

        let phase = manager.phase.as_ref().unwrap();
        assert_eq!(phase.failures, 2);
        assert!(phase.summary().ends_with(", 2 failed)"));

        send(&mut manager, Progress::PhaseFinish);
        assert!(manager.phase.is_none());
    }

    #[test]
    fn events_outside_a_phase_are_harmless() {
        let mut manager = hidden_manager();
        send(&mut manager, Progress::TaskIncrement { amount: 1 });
        send(&mut manager, Progress::Message("note".into()));
        manager.handle_event(UiEvent::Log("interrupted".into()));
        send(&mut manager, Progress::PhaseFinish);
        assert!(manager.phase.is_none());
    }

    #[tokio::test]
    async fn callback_forwards_events_to_the_channel() {
        let (sender, mut receiver) = mpsc::channel(1);
        let callback = CliProgressHandler::new(sender).get_callback();
        callback(Progress::PhaseStart {
            name: "backbone".into(),
        });

        match receiver.recv().await {
            Some(UiEvent::Progress(Progress::PhaseStart { name })) => assert_eq!(name, "backbone"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_drains_pending_events_before_exiting() {
        let (manager, sender, shutdown) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        sender
            .send(UiEvent::Progress(Progress::PhaseStart { name: "x".into() }))
            .await
            .unwrap();
        sender.send(UiEvent::Log("bye".into())).await.unwrap();
        shutdown.send(true).unwrap();
        tokio::spawn(manager.run()).await.unwrap();
    }
}
