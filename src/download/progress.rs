//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::ProgressSnapshot;

pub(crate) struct ProgressReporter {
    snapshot: ProgressSnapshot,
    cb: Option<Box<dyn FnMut(ProgressSnapshot) + Send>>, // optional UI callback
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// 无回调时在 stderr 画进度条；装了回调就只走回调。
    pub(crate) fn new(
        total: usize,
        cb: Option<Box<dyn FnMut(ProgressSnapshot) + Send>>,
    ) -> Self {
        let bar = if cb.is_none() && total > 0 {
            let bar = ProgressBar::with_draw_target(
                Some(total as u64),
                ProgressDrawTarget::stderr(),
            );
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            bar.set_style(style);
            bar.set_prefix("分段下载");
            Some(bar)
        } else {
            None
        };

        let mut reporter = Self {
            snapshot: ProgressSnapshot { completed: 0, total },
            cb,
            bar,
        };
        reporter.emit();
        reporter
    }

    /// 既无进度条也无回调，只做计数（测试与静默场景用）。
    #[cfg(test)]
    pub(crate) fn disabled(total: usize) -> Self {
        Self {
            snapshot: ProgressSnapshot { completed: 0, total },
            cb: None,
            bar: None,
        }
    }

    fn emit(&mut self) {
        if let Some(cb) = self.cb.as_mut() {
            cb(self.snapshot);
        }
    }

    /// 完成计数只增不减；每个任务完成（无论成败）推进一次。
    pub(crate) fn inc_completed(&mut self) {
        self.snapshot.completed = (self.snapshot.completed + 1).min(self.snapshot.total);
        if let Some(bar) = self.bar.as_ref() {
            bar.inc(1);
        }
        self.emit();
    }

    #[cfg(test)]
    pub(crate) fn completed(&self) -> usize {
        self.snapshot.completed
    }

    pub(crate) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_sees_monotonic_counts() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reporter = ProgressReporter::new(
            3,
            Some(Box::new(move |snap| {
                sink.lock().unwrap().push(snap.completed);
            })),
        );
        reporter.inc_completed();
        reporter.inc_completed();
        reporter.inc_completed();
        reporter.finish();

        let seen = seen.lock().unwrap();
        // 构造时上报一次 0，其后每次完成递增
        assert_eq!(*seen, vec![0, 1, 2, 3]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn count_saturates_at_total() {
        let mut reporter = ProgressReporter::disabled(1);
        reporter.inc_completed();
        reporter.inc_completed();
        assert_eq!(reporter.completed(), 1);
    }
}
