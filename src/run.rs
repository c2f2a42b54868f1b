// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Executes an extraction tree against a document.

use crate::bound_tree::Binder;
use crate::document::Document;
use crate::results::{generate_results, Results};
use crate::tree::Node;
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Configuration for one extraction run
///
/// This is a library-level value: there are no environment variables and no
/// configuration files.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// How many samples to take from the extraction tree. 0 means take no
    /// samples; a negative value means sample until the tree is exhausted.
    pub num_samples: i64,

    /// Timeout in seconds for the run. Negative disables the timeout.
    pub timeout: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_samples: 1,
            timeout: -1.0,
        }
    }
}

/// The per-run deadline, polled cooperatively from within the samplers
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub fn from_timeout_secs(timeout: f64) -> Self {
        if timeout.is_nan() || timeout < 0.0 {
            Self(None)
        } else {
            Self(Some(Instant::now() + Duration::from_secs_f64(timeout)))
        }
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|deadline| Instant::now() > deadline)
    }
}

/// How long the stages of a run took
#[derive(Clone, Copy, Debug)]
pub struct RuntimeInfo {
    /// Time spent binding the tree to the document, in milliseconds
    pub binding_ms: Option<u64>,

    /// Time spent pumping the bound tree for extractions, in milliseconds
    pub pumping_ms: Option<u64>,

    /// Total wall-clock time, in milliseconds
    pub total_ms: Option<u64>,

    /// Whether the run hit its deadline
    pub timed_out: bool,
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Runs an extraction tree on a document.
///
/// The root bound node is pumped until the configured sample count is
/// reached, the tree is exhausted, or the deadline fires; everything
/// yielded so far is then reported. A timeout is not an error: the partial
/// results carry `timed_out = true`.
///
/// # Errors
///
/// Structural and contract errors (bad trees, bad predicate parameters,
/// wrong entity variants) abort the run.
pub fn run_model(document: &Document, root: &Node, config: &Config) -> Result<Results> {
    let run_start = Instant::now();

    if config.num_samples == 0 {
        log::warn!("requested 0 extraction samples; no extractions will be generated");
    }

    root.validate_tree()?;

    let deadline = Deadline::from_timeout_secs(config.timeout);
    let binder = Binder::new(document, deadline);

    log::info!("binding extraction tree for {}", document.name());
    let binding_start = Instant::now();
    let mut timed_out = false;

    let mut bound = match root.bound_to(&binder) {
        Ok(bound) => Some(bound),
        Err(Error::Timeout) => {
            log::info!("extraction timed out while binding {}", document.name());
            timed_out = true;
            None
        }
        Err(e) => return Err(e),
    };
    let binding_ms = Some(elapsed_ms(binding_start));

    let mut pumping_ms = None;
    if let Some(bound) = &mut bound {
        log::info!("pumping extraction tree for {}", document.name());
        let pumping_start = Instant::now();

        let done = |generated: usize| {
            config.num_samples >= 0
                && i64::try_from(generated).unwrap_or(i64::MAX) >= config.num_samples
        };

        while !done(bound.num_extractions_generated()) {
            match bound.next_extraction() {
                Some(Ok(_)) => {}
                Some(Err(Error::Timeout)) => {
                    log::info!("extraction timed out for {}", document.name());
                    timed_out = true;
                    break;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if config.num_samples > 0 {
                        log::warn!(
                            "ran out of samples before {} were found",
                            config.num_samples
                        );
                    }
                    break;
                }
            }
        }

        pumping_ms = Some(elapsed_ms(pumping_start));

        if let Some(best) = &bound.common().best {
            log::debug!(
                "best extraction for {}: score {:.3} over {} fields",
                document.name(),
                best.score,
                best.extraction.len()
            );
        }
    }

    let runtime = RuntimeInfo {
        binding_ms,
        pumping_ms,
        total_ms: Some(elapsed_ms(run_start)),
        timed_out,
    };

    generate_results(bound.as_ref(), runtime)
}
