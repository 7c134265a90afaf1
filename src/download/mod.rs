//! Batch download of gallery images listed in a metadata catalog.

pub mod catalog;
pub mod fetch;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use catalog::{image_info, load_catalog, sanitize_filename, GalleryObject, Resolution};
pub use fetch::{Fetcher, HttpFetcher};

/// One image still to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
}

/// Download work derived from the catalog.
#[derive(Debug, Default)]
pub struct DownloadPlan {
    pub tasks: Vec<DownloadTask>,
    /// Objects with a `multimedia` entry, after the `max` limit.
    pub candidates: usize,
    /// Destination already on disk.
    pub existing: usize,
    /// No URL at the requested resolution.
    pub missing_url: usize,
    /// File name already claimed by an earlier object in the catalog.
    pub duplicate: usize,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Pause after each request.
    pub delay: Duration,
    /// 1 means strictly sequential requests.
    pub workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// Build the task list, skipping images that already exist in `output_dir`.
///
/// `max_images` of `None` or `Some(0)` means no limit. Each destination is
/// planned at most once.
pub fn plan_downloads(
    objects: &[GalleryObject],
    output_dir: &Path,
    resolution: Resolution,
    max_images: Option<usize>,
) -> DownloadPlan {
    let limit = max_images.filter(|&n| n > 0).unwrap_or(usize::MAX);
    let with_images = objects.iter().filter(|obj| obj.has_images()).take(limit);

    let mut plan = DownloadPlan::default();
    let mut planned: HashSet<PathBuf> = HashSet::new();

    for obj in with_images {
        plan.candidates += 1;

        let Some((url, filename)) = image_info(obj, resolution) else {
            plan.missing_url += 1;
            continue;
        };

        let dest = output_dir.join(filename);
        if dest.exists() {
            plan.existing += 1;
        } else if !planned.insert(dest.clone()) {
            tracing::debug!(dest = %dest.display(), "Destination already planned");
            plan.duplicate += 1;
        } else {
            plan.tasks.push(DownloadTask { url, dest });
        }
    }

    plan
}

fn fetch_one<F: Fetcher + ?Sized>(
    fetcher: &F,
    task: &DownloadTask,
    progress: &ProgressBar,
) -> bool {
    match fetcher.fetch(&task.url, &task.dest) {
        Ok(()) => {
            tracing::debug!(url = %task.url, dest = %task.dest.display(), "Downloaded");
            true
        }
        Err(e) => {
            progress.suspend(|| tracing::warn!(url = %task.url, "Download failed: {:#}", e));
            false
        }
    }
}

/// Fetch every task. Failures are logged and counted, never retried.
pub fn run_downloads<F: Fetcher + ?Sized>(
    tasks: &[DownloadTask],
    fetcher: &F,
    options: &DownloadOptions,
    progress: &ProgressBar,
) -> Result<DownloadSummary> {
    let downloaded = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let work = |task: &DownloadTask| {
        if fetch_one(fetcher, task, progress) {
            downloaded.fetch_add(1, Ordering::Relaxed);
        } else {
            failed.fetch_add(1, Ordering::Relaxed);
        }
        progress.inc(1);

        // Rate limiting
        if !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
    };

    if options.workers <= 1 {
        tasks.iter().for_each(work);
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .context("Failed to build download thread pool")?;
        pool.install(|| tasks.par_iter().for_each(work));
    }

    Ok(DownloadSummary {
        downloaded: downloaded.into_inner(),
        failed: failed.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn catalog() -> Vec<GalleryObject> {
        serde_json::from_value(json!([
            {"objectId": 1, "people": [{"firstName": "Albert", "familyName": "Edelfelt"}],
             "multimedia": [{"jpg": {"500": "https://img/1.jpg"}}]},
            {"objectId": 2, "multimedia": []},
            {"objectId": 3, "multimedia": [{"jpg": {"1000": "https://img/3-big.jpg"}}]},
            {"objectId": 4, "multimedia": [{"jpg": {"500": "https://img/4.jpg"}}]},
            {"objectId": 5, "multimedia": [{"jpg": {"500": "https://img/5.jpg"}}]}
        ]))
        .unwrap()
    }

    /// Writes a marker file, failing for URLs containing "fail".
    struct FakeFetcher {
        seen: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.seen.lock().unwrap().push(url.to_string());
            if url.contains("fail") {
                bail!("HTTP 404");
            }
            std::fs::write(dest, url)?;
            Ok(())
        }
    }

    #[test]
    fn test_plan_skips_existing_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Unknown_4.jpg"), b"already here").unwrap();

        let plan = plan_downloads(&catalog(), dir.path(), Resolution::R500, None);

        assert_eq!(plan.candidates, 4);
        assert_eq!(plan.existing, 1);
        assert_eq!(plan.missing_url, 1);
        assert_eq!(
            plan.tasks,
            vec![
                DownloadTask {
                    url: "https://img/1.jpg".to_string(),
                    dest: dir.path().join("Albert_Edelfelt_1.jpg"),
                },
                DownloadTask {
                    url: "https://img/5.jpg".to_string(),
                    dest: dir.path().join("Unknown_5.jpg"),
                },
            ]
        );
    }

    #[test]
    fn test_plan_max_counts_objects_with_images() {
        let dir = tempdir().unwrap();
        let plan = plan_downloads(&catalog(), dir.path(), Resolution::R500, Some(2));

        assert_eq!(plan.candidates, 2);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.missing_url, 1);
    }

    #[test]
    fn test_plan_zero_max_means_no_limit() {
        let dir = tempdir().unwrap();
        let unlimited = plan_downloads(&catalog(), dir.path(), Resolution::R500, None);
        let zero = plan_downloads(&catalog(), dir.path(), Resolution::R500, Some(0));

        assert_eq!(zero.candidates, 4);
        assert_eq!(zero.tasks, unlimited.tasks);
    }

    #[test]
    fn test_plan_colliding_file_names_planned_once() {
        let dir = tempdir().unwrap();
        let objects: Vec<GalleryObject> = serde_json::from_value(json!([
            {"objectId": "a/1", "multimedia": [{"jpg": {"500": "https://img/a-slash-1.jpg"}}]},
            {"objectId": "a1", "multimedia": [{"jpg": {"500": "https://img/a1.jpg"}}]}
        ]))
        .unwrap();

        let plan = plan_downloads(&objects, dir.path(), Resolution::R500, None);

        assert_eq!(plan.candidates, 2);
        assert_eq!(plan.duplicate, 1);
        assert_eq!(
            plan.tasks,
            vec![DownloadTask {
                url: "https://img/a-slash-1.jpg".to_string(),
                dest: dir.path().join("Unknown_a1.jpg"),
            }]
        );
    }

    #[test]
    fn test_run_downloads_counts_failures() {
        let dir = tempdir().unwrap();
        let tasks = vec![
            DownloadTask { url: "https://img/a.jpg".into(), dest: dir.path().join("a.jpg") },
            DownloadTask { url: "https://img/fail.jpg".into(), dest: dir.path().join("b.jpg") },
            DownloadTask { url: "https://img/c.jpg".into(), dest: dir.path().join("c.jpg") },
        ];
        let fetcher = FakeFetcher { seen: Mutex::new(Vec::new()) };
        let options = DownloadOptions { delay: Duration::ZERO, workers: 1 };

        let summary = run_downloads(&tasks, &fetcher, &options, &ProgressBar::hidden()).unwrap();

        assert_eq!(summary, DownloadSummary { downloaded: 2, failed: 1 });
        assert_eq!(
            *fetcher.seen.lock().unwrap(),
            vec!["https://img/a.jpg", "https://img/fail.jpg", "https://img/c.jpg"]
        );
        assert!(dir.path().join("c.jpg").exists());
        assert!(!dir.path().join("b.jpg").exists());
    }

    #[test]
    fn test_run_downloads_with_workers() {
        let dir = tempdir().unwrap();
        let tasks: Vec<DownloadTask> = (0..8)
            .map(|i| DownloadTask {
                url: format!("https://img/{i}.jpg"),
                dest: dir.path().join(format!("{i}.jpg")),
            })
            .collect();
        let fetcher = FakeFetcher { seen: Mutex::new(Vec::new()) };
        let options = DownloadOptions { delay: Duration::from_millis(1), workers: 3 };

        let summary = run_downloads(&tasks, &fetcher, &options, &ProgressBar::hidden()).unwrap();

        assert_eq!(summary.downloaded, 8);
        assert_eq!(fetcher.seen.lock().unwrap().len(), 8);
    }
}
