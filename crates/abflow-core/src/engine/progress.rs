#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PhaseStart { name: String },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement { amount: u64 },
    TaskFinish,

    StatusUpdate { text: String },
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    pub fn phase(&self, name: impl Into<String>) {
        self.report(Progress::PhaseStart { name: name.into() });
    }

    pub fn status(&self, text: impl Into<String>) {
        self.report(Progress::StatusUpdate { text: text.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn silent_reporter_accepts_events() {
        ProgressReporter::new().report(Progress::PhaseFinish);
    }

    #[test]
    fn callback_receives_events_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            seen.lock().unwrap().push(event);
        }));
        reporter.phase("backbone");
        reporter.report(Progress::TaskIncrement { amount: 2 });
        drop(reporter);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                Progress::PhaseStart {
                    name: "backbone".to_string()
                },
                Progress::TaskIncrement { amount: 2 },
            ]
        );
    }
}
