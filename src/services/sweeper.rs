//! One sweep: list every remote object under the root prefix and mirror the
//! ones missing locally, strictly one object at a time.

use crate::{
    models::remote_object::RemoteObject,
    services::{
        key_mapper::{KeyMapper, MapOutcome},
        mirror_writer::{MirrorError, MirrorOutcome, MirrorWriter},
        remote_store::{self, RemoteError, RemoteStore},
        scheduler::RecurringTask,
    },
};
use async_trait::async_trait;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("listing remote objects under `{prefix}` failed: {source}")]
    Listing {
        prefix: String,
        #[source]
        source: RemoteError,
    },
}

/// Per-sweep tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub listed: usize,
    pub mirrored: usize,
    pub already_present: usize,
    pub unmapped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn RemoteStore>,
    mapper: KeyMapper,
    writer: MirrorWriter,
}

impl Sweeper {
    pub fn new(store: Arc<dyn RemoteStore>, mapper: KeyMapper) -> Self {
        let writer = MirrorWriter::new(store.clone());
        Self {
            store,
            mapper,
            writer,
        }
    }

    pub fn mapper(&self) -> &KeyMapper {
        &self.mapper
    }

    /// Run one full pass.
    ///
    /// Only a listing failure aborts the sweep; per-object failures are
    /// logged, counted and the loop moves on.
    #[instrument(skip_all, fields(root = %self.mapper.root()))]
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let prefix = self.mapper.root();
        let objects = remote_store::list_all(self.store.as_ref(), prefix)
            .await
            .map_err(|source| SweepError::Listing {
                prefix: prefix.to_string(),
                source,
            })?;

        let mut report = SweepReport {
            listed: objects.len(),
            ..Default::default()
        };
        if objects.is_empty() {
            warn!(prefix, "no remote objects found");
        }

        for object in &objects {
            match self.mirror_one(object).await {
                Ok(Some(MirrorOutcome::Mirrored { .. })) => report.mirrored += 1,
                Ok(Some(MirrorOutcome::AlreadyPresent)) => report.already_present += 1,
                Ok(None) => report.unmapped += 1,
                Err(err) => {
                    error!(public_id = %object.public_id, error = %err, "failed to mirror object");
                    report.failed += 1;
                }
            }
        }

        info!(
            listed = report.listed,
            mirrored = report.mirrored,
            already_present = report.already_present,
            unmapped = report.unmapped,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sweep finished"
        );
        Ok(report)
    }

    /// Map and mirror a single object. `Ok(None)` when its key does not fit
    /// the layout (logged as a warning).
    pub async fn mirror_one(
        &self,
        object: &RemoteObject,
    ) -> Result<Option<MirrorOutcome>, MirrorError> {
        match self.mapper.map(object) {
            MapOutcome::Mapped(targets) => self.writer.mirror(object, &targets).await.map(Some),
            MapOutcome::Skipped(reason) => {
                warn!(public_id = %object.public_id, %reason, "skipping object with unexpected key layout");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl RecurringTask for Sweeper {
    fn name(&self) -> &str {
        "mirror-sweep"
    }

    async fn run(&self) {
        if let Err(err) = self.sweep().await {
            error!(error = %err, "sweep abandoned until the next run");
        }
    }
}
