//! # validate_windows
//!
//! Resolves every window of both splits and reports the sequences that are
//! too short to host one. The report is written next to the annotations as
//! `window_report_<split>.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cal_dataset::{io::save_json, DatasetConfig, SequenceWindowedDataset};
use indicatif::ProgressBar;
use once_cell::sync::Lazy;
use serde::Serialize;

#[macro_use]
extern crate log;

/// Default root directory, overridden by the first command-line argument.
static ROOT_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir()
        .unwrap_or_default()
        .join("data/datasets/cal/")
});

/// Split names for the dataset.
static SPLIT_NAMES: [&str; 2] = ["train", "val"];

/// Frames per window.
const SEQ_LEN: usize = 10;

#[derive(Debug, Serialize)]
struct WindowReport {
    split: String,
    seq_len: usize,
    total_frames: usize,
    num_sequences: usize,
    resolved_windows: usize,
    underflows: usize,
    short_sequences: Vec<(usize, usize)>,
}

/// Script entrypoint.
pub fn main() -> Result<()> {
    env_logger::init();
    let root_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| ROOT_DIR.clone());

    for split_name in SPLIT_NAMES {
        let config = DatasetConfig::new(&root_dir, split_name, SEQ_LEN)?;
        let dataset = SequenceWindowedDataset::new(config)
            .with_context(|| format!("Cannot load `{split_name}` split from {root_dir:?}."))?;

        let bar = ProgressBar::new(dataset.len() as u64);
        let (mut resolved_windows, mut underflows) = (0, 0);
        for index in 0..dataset.len() {
            match dataset.resolve_window(index as i64) {
                Ok(_) => resolved_windows += 1,
                Err(error) => {
                    debug!("{error}");
                    underflows += 1;
                }
            }
            bar.inc(1);
        }
        bar.finish();

        let boundaries = dataset.boundaries();
        let report = WindowReport {
            split: split_name.to_string(),
            seq_len: SEQ_LEN,
            total_frames: dataset.len(),
            num_sequences: boundaries.num_sequences(),
            resolved_windows,
            underflows,
            short_sequences: boundaries
                .short_sequences(SEQ_LEN)
                .into_iter()
                .map(|range| (range.start, range.end))
                .collect(),
        };
        if underflows > 0 {
            warn!("{underflows} indices of the `{split_name}` split cannot be windowed.");
        }
        info!("{report:?}");
        save_json(&report, &root_dir.join(format!("window_report_{split_name}")))?;
    }
    Ok(())
}
