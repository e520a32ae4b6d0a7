use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, unbounded};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crate::pipeline::Backends;
use crate::runtime::{BoundedChannel, CancelSignal, Supervisor, Worker};
use crate::stages::{Consumer, Notifier, PollSettings, Producer, Searcher, SimpleWorker};
use crate::types::{ItemCompleted, OriginalImage, PipelineConfig};
use crate::utils::config::SupervisorConsts;

/// A running pipeline: searchers, producers and simple workers upstream of the channel,
/// consumers downstream, each side under its own supervisor.
pub struct Pipeline {
    config: PipelineConfig,
    channel: Arc<BoundedChannel<OriginalImage>>,
    upstream: Option<Supervisor>,
    downstream: Option<Supervisor>,
    stopped: AtomicBool,
}

impl Pipeline {
    /// Validate `config`, build every worker and start them. Returns the pipeline and the
    /// receiving end of the "item completed" notifications.
    pub fn start(
        config: PipelineConfig,
        backends: Backends,
    ) -> Result<(Self, Receiver<ItemCompleted>)> {
        config.validate()?;
        debug!(
            "{} CONFIG:{:#?}",
            env!("CARGO_PKG_NAME").to_uppercase(),
            config
        );

        let (done_tx, done_rx) = unbounded();
        let notifier = Notifier::new(done_tx);
        let channel = Arc::new(BoundedChannel::new(config.channel_capacity));
        let settings = PollSettings::from(&config);

        let consumers: Vec<Arc<dyn Worker>> = (0..config.consumers)
            .map(|i| {
                Arc::new(Consumer::new(
                    format!("consumer-{i}"),
                    Arc::clone(&channel),
                    Arc::clone(&backends.results),
                    Arc::clone(&backends.transform),
                    notifier.clone(),
                    config.take_timeout,
                )) as Arc<dyn Worker>
            })
            .collect();

        let mut upstream: Vec<Arc<dyn Worker>> = Vec::new();
        let targets = backends.request_targets(&config);
        for i in 0..config.searchers {
            upstream.push(Arc::new(Searcher::new(
                format!("searcher-{i}"),
                Arc::clone(&backends.keywords),
                Arc::clone(&backends.source),
                Arc::clone(&backends.originals),
                targets.clone(),
                settings.clone(),
                config.search_limit,
            )));
        }
        for i in 0..config.producers {
            upstream.push(Arc::new(Producer::new(
                format!("producer-{i}"),
                Arc::clone(&backends.requests),
                Arc::clone(&backends.originals),
                Arc::clone(&channel),
                settings.clone(),
                config.add_timeout,
            )));
        }
        for i in 0..config.simple_workers {
            upstream.push(Arc::new(SimpleWorker::new(
                format!("simple-{i}"),
                Arc::clone(&backends.simple_requests),
                Arc::clone(&backends.originals),
                Arc::clone(&backends.results),
                Arc::clone(&backends.transform),
                notifier.clone(),
                settings.clone(),
            )));
        }

        // A fatal error on either side of the channel stops the other side too.
        let upstream_cancel = CancelSignal::new();
        let downstream_cancel = CancelSignal::new();

        // Consumers first so the channel has a reader before anything is added.
        let downstream = start_group(
            "consumers",
            consumers,
            &config,
            downstream_cancel.clone(),
            upstream_cancel.clone(),
        )?;
        let upstream = match start_group(
            "upstream",
            upstream,
            &config,
            upstream_cancel,
            downstream_cancel,
        ) {
            Ok(s) => s,
            Err(e) => {
                if let Some(s) = &downstream {
                    let _ = s.stop();
                }
                return Err(e);
            }
        };
        info!(
            "pipeline started: {} searchers, {} producers, {} consumers, {} simple workers",
            config.searchers, config.producers, config.consumers, config.simple_workers
        );

        Ok((
            Self {
                config,
                channel,
                upstream,
                downstream,
                stopped: AtomicBool::new(false),
            },
            done_rx,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Worker runs currently in flight across both supervisors.
    pub fn active_count(&self) -> usize {
        self.groups().map(Supervisor::active_count).sum()
    }

    pub fn restart_count(&self) -> usize {
        self.groups().map(Supervisor::restart_count).sum()
    }

    /// Items waiting in the producer → consumer channel.
    pub fn buffered(&self) -> usize {
        self.channel.len()
    }

    /// True when either supervisor has ended, i.e. after `stop` or a fatal worker error
    /// (which also cancels the other side of the channel).
    pub fn is_finished(&self) -> bool {
        self.groups().any(Supervisor::is_finished)
    }

    /// Stop upstream workers, complete the channel, give consumers up to `drain_grace` to
    /// empty it, then stop the consumers. Later calls return `Ok(())`.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("stopping pipeline");
        let upstream = match &self.upstream {
            Some(s) => s.stop().context("upstream workers"),
            None => Ok(()),
        };
        self.channel.complete();
        self.wait_for_drain();
        let downstream = match &self.downstream {
            Some(s) => s.stop().context("consumers"),
            None => Ok(()),
        };
        info!("pipeline stopped");
        upstream?;
        downstream
    }

    fn wait_for_drain(&self) {
        if self.downstream.is_none() {
            return;
        }
        let deadline = Instant::now() + self.config.drain_grace;
        while !self.channel.is_empty() && Instant::now() < deadline {
            if self.downstream.as_ref().is_some_and(Supervisor::is_finished) {
                break;
            }
            thread::sleep(SupervisorConsts::DRAIN_POLL);
        }
        let left = self.channel.len();
        if left > 0 {
            warn!("{} items left in the channel at shutdown", left);
        }
    }

    fn groups(&self) -> impl Iterator<Item = &Supervisor> {
        self.upstream.iter().chain(self.downstream.iter())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("pipeline shutdown: {e:#}");
        }
    }
}

fn start_group(
    name: &str,
    workers: Vec<Arc<dyn Worker>>,
    config: &PipelineConfig,
    cancel: CancelSignal,
    sibling: CancelSignal,
) -> Result<Option<Supervisor>> {
    if workers.is_empty() {
        return Ok(None);
    }
    let sup = Supervisor::start_linked(
        name,
        workers,
        config.restart_backoff,
        cancel,
        vec![sibling],
    )
    .with_context(|| format!("starting {name}"))?;
    Ok(Some(sup))
}
