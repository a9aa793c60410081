//! 分段并发下载工作池。
//!
//! 每个分段一个任务，投入固定宽度的 worker 池；任务之间相互独立，单个
//! 失败不牵连其余（不做 fail-fast）。结果写入互斥保护的共享表（index
//! 唯一，互不争抢同一槽位），每个任务完成后向调用方推送一次完成事件。
//! `run` 在所有任务完成并 join 全部 worker 后才返回——显式汇合屏障，
//! 不是提交后放任不管。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crossbeam_channel as channel;
use tracing::debug;

use crate::base_system::config::Config;
use super::fetcher::SegmentFetcher;
use super::models::{FetchResult, SegmentDescriptor, StreamTarget};
use super::progress::ProgressReporter;

/// 抓取全部分段。会话（HTTP 客户端）按 worker 构建，worker 间不共享。
pub(crate) fn run(
    config: &Config,
    target: &StreamTarget,
    descriptors: &[SegmentDescriptor],
    temp_dir: &Path,
    progress: &mut ProgressReporter,
) -> HashMap<usize, FetchResult> {
    run_with(
        config.max_workers,
        descriptors,
        progress,
        || SegmentFetcher::new(config, target).ok(),
        |session, desc| match session {
            Some(fetcher) => fetcher.fetch(desc, temp_dir),
            // 会话构建失败的 worker 只能把领到的任务判失败
            None => FetchResult::failed(desc.index),
        },
    )
}

/// 池骨架：worker 初始化与任务执行从外部注入，便于确定性测试。
pub(crate) fn run_with<W, I, T>(
    width: usize,
    descriptors: &[SegmentDescriptor],
    progress: &mut ProgressReporter,
    worker_init: I,
    task: T,
) -> HashMap<usize, FetchResult>
where
    I: Fn() -> W + Sync,
    T: Fn(&mut W, &SegmentDescriptor) -> FetchResult + Sync,
{
    let total = descriptors.len();
    let results = Mutex::new(HashMap::with_capacity(total));
    if total == 0 {
        return unwrap_results(results);
    }

    let workers = width.clamp(1, total);
    debug!(target: "download", workers, total, "启动分段工作池");

    let (tx_job, rx_job) = channel::unbounded::<SegmentDescriptor>();
    let (tx_evt, rx_evt) = channel::unbounded::<usize>();
    for desc in descriptors {
        // unbounded 通道只在接收端全部断开时拒收，此处不可能
        let _ = tx_job.send(desc.clone());
    }
    drop(tx_job);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx_job = rx_job.clone();
            let tx_evt = tx_evt.clone();
            let results = &results;
            let worker_init = &worker_init;
            let task = &task;
            scope.spawn(move || {
                let mut session = worker_init();
                while let Ok(desc) = rx_job.recv() {
                    let index = desc.index;
                    let result = task(&mut session, &desc);
                    match results.lock() {
                        Ok(mut guard) => {
                            guard.insert(index, result);
                        }
                        Err(poisoned) => {
                            poisoned.into_inner().insert(index, result);
                        }
                    }
                    let _ = tx_evt.send(index);
                }
            });
        }
        drop(tx_evt);

        // 收齐每个任务的完成事件；scope 退出前还会 join 全部 worker
        let mut done = 0usize;
        while done < total {
            match rx_evt.recv() {
                Ok(_) => {
                    done += 1;
                    progress.inc_completed();
                }
                Err(channel::RecvError) => break,
            }
        }
    });

    unwrap_results(results)
}

fn unwrap_results(
    results: Mutex<HashMap<usize, FetchResult>>,
) -> HashMap<usize, FetchResult> {
    match results.into_inner() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::FetchOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptors(n: usize) -> Vec<SegmentDescriptor> {
        (0..n)
            .map(|i| SegmentDescriptor {
                index: i,
                url: format!("seg{i}.ts"),
                duration: None,
                byte_range: None,
            })
            .collect()
    }

    #[test]
    fn pool_collects_every_result_and_reports_failures_as_entries() {
        // 池宽 3、10 个分段、{2,5} 确定性失败 → 恰好 8 个成功结果
        let descs = descriptors(10);
        let mut progress = ProgressReporter::disabled(descs.len());
        let results = run_with(
            3,
            &descs,
            &mut progress,
            || (),
            |_, desc| {
                if desc.index == 2 || desc.index == 5 {
                    FetchResult::failed(desc.index)
                } else {
                    FetchResult::succeeded(desc.index, format!("/tmp/{}", desc.index).into())
                }
            },
        );

        assert_eq!(results.len(), 10);
        let succeeded: Vec<usize> = {
            let mut v: Vec<usize> = results
                .values()
                .filter(|r| r.is_success())
                .map(|r| r.index)
                .collect();
            v.sort_unstable();
            v
        };
        assert_eq!(succeeded, vec![0, 1, 3, 4, 6, 7, 8, 9]);
        assert_eq!(results[&2].outcome, FetchOutcome::Failure);
        assert_eq!(progress.completed(), 10);
    }

    #[test]
    fn each_worker_gets_its_own_session() {
        let sessions = AtomicUsize::new(0);
        let descs = descriptors(8);
        let mut progress = ProgressReporter::disabled(descs.len());
        let _ = run_with(
            4,
            &descs,
            &mut progress,
            || sessions.fetch_add(1, Ordering::SeqCst),
            |_, desc| FetchResult::succeeded(desc.index, "/tmp/x".into()),
        );
        assert_eq!(sessions.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn width_is_clamped_to_task_count() {
        let descs = descriptors(2);
        let mut progress = ProgressReporter::disabled(descs.len());
        let results = run_with(
            50,
            &descs,
            &mut progress,
            || (),
            |_, desc| FetchResult::succeeded(desc.index, "/tmp/x".into()),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(progress.completed(), 2);
    }

    #[test]
    fn empty_input_returns_immediately() {
        let mut progress = ProgressReporter::disabled(0);
        let results = run_with(4, &[], &mut progress, || (), |_, desc| {
            FetchResult::failed(desc.index)
        });
        assert!(results.is_empty());
        assert_eq!(progress.completed(), 0);
    }
}
