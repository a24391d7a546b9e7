//! Periodic hourly and daily ticks
//!
//! Each frequency runs in its own task with its own interval, so a slow
//! daily digest never delays the hourly one. Both stop on shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::Frequency;

pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerIntervals {
    pub hourly: Duration,
    pub daily: Duration,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            hourly: Duration::from_secs(3600),
            daily: Duration::from_secs(86_400),
        }
    }
}

pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the hourly and daily tick tasks
    pub fn start<F>(intervals: SchedulerIntervals, on_tick: F) -> Self
    where
        F: Fn(Frequency) -> TickFuture + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let on_tick = Arc::new(on_tick);

        let handles = [
            (Frequency::Hourly, intervals.hourly),
            (Frequency::Daily, intervals.daily),
        ]
        .into_iter()
        .map(|(frequency, period)| {
            let on_tick = Arc::clone(&on_tick);
            let mut shutdown_rx = shutdown_rx.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // Skip the first tick which fires immediately
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            debug!(frequency = %frequency, "Scheduler tick");
                            on_tick(frequency).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                info!(frequency = %frequency, "Scheduler task shutting down");
                                break;
                            }
                        }
                    }
                }
            })
        })
        .collect();

        info!(
            hourly_secs = intervals.hourly.as_secs(),
            daily_secs = intervals.daily.as_secs(),
            "⏰ Notification scheduler started"
        );

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Stop both tasks and wait for them. A tick in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_frequencies_tick_independently() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&ticks);

        let scheduler = Scheduler::start(
            SchedulerIntervals {
                hourly: Duration::from_secs(10),
                daily: Duration::from_secs(25),
            },
            move |frequency| {
                let recorded = Arc::clone(&recorded);
                Box::pin(async move {
                    recorded.lock().unwrap().push(frequency);
                })
            },
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        scheduler.shutdown().await;

        let ticks = ticks.lock().unwrap().clone();
        let hourly = ticks.iter().filter(|f| **f == Frequency::Hourly).count();
        let daily = ticks.iter().filter(|f| **f == Frequency::Daily).count();
        assert_eq!(hourly, 3);
        assert_eq!(daily, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_shutdown() {
        let ticks = Arc::new(Mutex::new(0usize));
        let recorded = Arc::clone(&ticks);

        let scheduler = Scheduler::start(
            SchedulerIntervals {
                hourly: Duration::from_secs(10),
                daily: Duration::from_secs(10),
            },
            move |_| {
                let recorded = Arc::clone(&recorded);
                Box::pin(async move {
                    *recorded.lock().unwrap() += 1;
                })
            },
        );

        tokio::time::sleep(Duration::from_secs(15)).await;
        scheduler.shutdown().await;
        let before = *ticks.lock().unwrap();
        assert_eq!(before, 2);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(*ticks.lock().unwrap(), before);
    }
}
