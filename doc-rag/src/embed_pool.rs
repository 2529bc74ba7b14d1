//! Bounded worker pool for per-file load → chunk → embed units.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::errors::RagError;
use crate::record::Chunk;

/// Chunks of one file with their vectors, index-aligned.
#[derive(Debug)]
pub struct EmbeddedUnit {
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

/// Outcome of one file, tagged with its position in the input list.
pub type UnitOutcome = (usize, PathBuf, Result<EmbeddedUnit, RagError>);

/// Runs `unit` for every file on the blocking pool, at most `workers` at a time.
///
/// Outcomes are returned in input order regardless of completion order.
pub async fn run_units<F>(files: Vec<PathBuf>, workers: usize, unit: F) -> Vec<UnitOutcome>
where
    F: Fn(&std::path::Path) -> Result<EmbeddedUnit, RagError> + Send + Sync + 'static,
{
    let workers = workers.max(1);
    info!(target: "doc_rag::ingest", files = files.len(), workers, "embedding files");

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let unit = Arc::new(unit);
    let mut outcomes: Vec<UnitOutcome> = stream::iter(files.into_iter().enumerate())
        .map(|(i, path)| {
            let unit = Arc::clone(&unit);
            let pb = pb.clone();
            async move {
                let p = path.clone();
                let res = match tokio::task::spawn_blocking(move || (*unit)(&p)).await {
                    Ok(r) => r,
                    Err(e) => Err(RagError::from(e)),
                };
                if let Some(name) = path.file_name() {
                    pb.set_message(name.to_string_lossy().into_owned());
                }
                pb.inc(1);
                (i, path, res)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    pb.finish_and_clear();
    outcomes.sort_by_key(|(i, _, _)| *i);
    debug!(target: "doc_rag::ingest", done = outcomes.len(), "embedding units finished");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn keeps_input_order_and_isolates_failures() {
        let files: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("f{i}.pdf"))).collect();
        let out = run_units(files, 3, |p| {
            let name = p.to_string_lossy().into_owned();
            // Earlier files finish last.
            let n: u64 = name[1..2].parse().unwrap();
            std::thread::sleep(Duration::from_millis(30 - n * 5));
            if name == "f2.pdf" {
                return Err(RagError::EmptyDocument(p.to_path_buf()));
            }
            Ok(EmbeddedUnit {
                chunks: Vec::new(),
                vectors: Vec::new(),
            })
        })
        .await;

        let order: Vec<usize> = out.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert!(out[2].2.is_err());
        assert_eq!(out.iter().filter(|(_, _, r)| r.is_ok()).count(), 5);
    }
}
