//! Recurring scene activation
//!
//! Every enabled trigger spec with a cron expression installs one recurring
//! job per scene per direction. Jobs only fire while the process runs;
//! there is no catch-up for fire times missed while it was stopped. A
//! reload tears all jobs down and reinstalls from the new configuration.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::trigger::Direction;

/// A scene activation request produced by a cron fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub scene_id: String,
    pub direction: Direction,
}

/// Installs and owns the recurring activation jobs
pub struct CronScheduler {
    tx: mpsc::UnboundedSender<Activation>,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl CronScheduler {
    /// Create a scheduler and the channel its fires are delivered on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Activation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                jobs: Mutex::new(Vec::new()),
            },
            rx,
        )
    }

    /// Replace all installed jobs from (scene, direction, expression) specs
    ///
    /// Invalid expressions are logged and skipped; the scene simply has no
    /// schedule for that direction.
    pub fn install(&self, specs: Vec<(String, Direction, String)>) {
        self.cancel_all();

        let mut jobs = self.jobs.lock().unwrap();
        for (scene_id, direction, expr) in specs {
            let schedule = match Schedule::from_str(&expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(
                        scene = %scene_id,
                        expression = %expr,
                        error = %e,
                        "Invalid cron expression, skipping schedule"
                    );
                    continue;
                }
            };

            debug!(scene = %scene_id, direction = %direction, expression = %expr, "Installing cron schedule");

            let tx = self.tx.clone();
            jobs.push(tokio::spawn(async move {
                loop {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        break;
                    };
                    let Ok(wait) = (next - Utc::now()).to_std() else {
                        // Fire time already passed while computing; skip it
                        continue;
                    };
                    tokio::time::sleep(wait).await;

                    let activation = Activation {
                        scene_id: scene_id.clone(),
                        direction,
                    };
                    if tx.send(activation).is_err() {
                        break;
                    }
                }
            }));
        }
    }

    /// Tear down all installed jobs
    pub fn cancel_all(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        for job in jobs.drain(..) {
            job.abort();
        }
    }

    /// Number of installed jobs (test hook)
    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}
