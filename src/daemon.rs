use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::{AppConfig, Migration};
use crate::controller::MigrationController;
use crate::error::Result;
use crate::internal_client::InternalClient;
use crate::provider::Provider;
use crate::selector::Ring;
use crate::status::StatusStore;

/// Iterates configured migrations once, running a pass for each, pruning
/// stale status entries, then sleeping out the remainder of `poll_interval`.
pub struct Daemon<P, IC, R> {
    pub config: AppConfig,
    pub controller: Arc<MigrationController<P, IC, R>>,
}

impl<P, IC, R> Daemon<P, IC, R>
where
    P: Provider + Send + Sync + 'static,
    IC: InternalClient + Send + Sync + 'static,
    R: Ring + Send + Sync + 'static,
{
    pub fn new(config: AppConfig, controller: MigrationController<P, IC, R>) -> Self {
        Self {
            config,
            controller: Arc::new(controller),
        }
    }

    /// Runs one full sweep over all configured migrations, logging and
    /// continuing past any single migration's failure rather than aborting
    /// the whole sweep.
    pub async fn process_migrations(&self, status: &mut StatusStore) -> Result<()> {
        let mut handled_containers: Vec<String> = Vec::new();

        for migration in &self.config.migrations {
            match self.controller.run_pass(migration, status).await {
                Ok(containers) => handled_containers.extend(containers),
                Err(e) => {
                    error!(account = %migration.account, bucket = %migration.aws_bucket, error = %e, "migration pass failed");
                }
            }
        }

        status.prune(&self.config.migrations);
        Ok(())
    }

    /// Runs [`Daemon::process_migrations`] in a loop, sleeping
    /// `max(0, poll_interval - elapsed)` between sweeps. Never returns under
    /// normal operation; intended to be spawned as the top-level task.
    pub async fn run(&self, status: &mut StatusStore) -> Result<()> {
        loop {
            let start = std::time::Instant::now();
            self.process_migrations(status).await?;
            let elapsed = start.elapsed();
            let interval = Duration::from_secs(self.config.daemon.poll_interval);
            if elapsed < interval {
                info!(sleep_secs = (interval - elapsed).as_secs(), "pass complete, sleeping");
                tokio::time::sleep(interval - elapsed).await;
            }
        }
    }
}

pub fn current_migrations(config: &AppConfig) -> &[Migration] {
    &config.migrations
}
