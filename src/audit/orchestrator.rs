//! Batch orchestrator - the audit state machine
//!
//! One call to [`Orchestrator::run_batch`] is one scheduler invocation:
//! - Resume from the persisted queue, pages and check results
//! - Crawl breadth-first until the page or wall-clock budget is hit
//! - Poll the cancellation signal after every page
//! - Once the queue is empty (or a stop was requested), run the site-wide
//!   checks, score the audit and move it to a terminal state
//!
//! Everything needed to resume is written before the call returns, so a
//! killed process loses at most the page it was fetching.

use crate::audit::{AuditFacts, AuditFailure, BatchOutcome, SummaryGenerator};
use crate::checks::{CheckEngine, Dismissals};
use crate::config::Config;
use crate::crawler::{parse_html, FetchResult, Fetcher, Frontier, ParsedPage};
use crate::scoring;
use crate::state::AuditStatus;
use crate::storage::{NewPage, QueueEntry, Storage};
use crate::url::classify_resource;
use crate::{AuditError, Result};
use std::time::{Duration, Instant};
use url::Url;

/// Why the page loop of a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// Batch size or time budget reached
    Budget,
    /// Nothing left to claim, or the page cap was reached
    Exhausted,
    /// The cancellation signal was raised
    StopRequested,
}

/// Drives audits through their lifecycle, one batch at a time
pub struct Orchestrator<S: Storage> {
    storage: S,
    fetcher: Fetcher,
    summary: SummaryGenerator,
    batch_size: u32,
    time_budget: Duration,
    request_delay: Duration,
    aux_timeout: Duration,
    max_pages: Option<u32>,
}

impl<S: Storage> Orchestrator<S> {
    /// Creates an orchestrator over `storage`
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run batches
    /// * `Err(AuditError)` - An HTTP client could not be built
    pub fn new(storage: S, config: &Config) -> Result<Self> {
        let auditor = &config.auditor;

        Ok(Self {
            storage,
            fetcher: Fetcher::new(
                &config.user_agent,
                Duration::from_secs(auditor.request_timeout),
            )?,
            summary: SummaryGenerator::from_config(config.summary.as_ref())?,
            batch_size: auditor.batch_size,
            time_budget: Duration::from_secs(auditor.batch_time_budget),
            request_delay: Duration::from_millis(auditor.request_delay),
            aux_timeout: Duration::from_secs(auditor.aux_timeout),
            max_pages: auditor.max_pages,
        })
    }

    /// Replaces the summary generator built from the configuration
    pub fn with_summary_generator(mut self, summary: SummaryGenerator) -> Self {
        self.summary = summary;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Creates a pending audit for `root_url`
    ///
    /// The URL is validated and normalized here so that a bad root never
    /// reaches the queue.
    pub fn create_audit(&mut self, root_url: &str, tenant_id: Option<i64>) -> Result<i64> {
        let root = Frontier::normalize_root(root_url)?;
        let audit_id = self.storage.create_audit(root.as_str(), tenant_id)?;
        tracing::info!("Created audit {} for {}", audit_id, root);
        Ok(audit_id)
    }

    /// Raises the cancellation signal
    ///
    /// # Returns
    ///
    /// `false` if the audit is already terminal
    pub fn request_stop(&mut self, audit_id: i64) -> Result<bool> {
        let raised = self.storage.request_stop(audit_id)?;
        if raised {
            tracing::info!("Stop requested for audit {}", audit_id);
        } else {
            tracing::warn!("Audit {} is already finished, stop ignored", audit_id);
        }
        Ok(raised)
    }

    /// Runs batches until the audit is terminal
    pub async fn run_to_completion(&mut self, audit_id: i64) -> Result<AuditStatus> {
        loop {
            match self.run_batch(audit_id).await? {
                BatchOutcome::Yielded => continue,
                BatchOutcome::Finished(status) => return Ok(status),
            }
        }
    }

    /// Runs one batch of an audit
    ///
    /// An error moves the audit to `failed` with its message persisted, then
    /// is returned so the caller sees the invocation fail.
    pub async fn run_batch(&mut self, audit_id: i64) -> Result<BatchOutcome> {
        match self.drive_batch(audit_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Batch of audit {} failed: {}", audit_id, e);
                let failure = AuditFailure::Internal(e.to_string()).to_string();
                if let Err(persist) =
                    self.storage
                        .finish_audit(audit_id, AuditStatus::Failed, Some(&failure))
                {
                    tracing::error!("Could not mark audit {} as failed: {}", audit_id, persist);
                }
                Err(e)
            }
        }
    }

    async fn drive_batch(&mut self, audit_id: i64) -> Result<BatchOutcome> {
        let audit = self.storage.get_audit(audit_id)?;
        if audit.status.is_terminal() {
            tracing::info!("Audit {} is already {}", audit_id, audit.status);
            return Ok(BatchOutcome::Finished(audit.status));
        }

        let root = Frontier::normalize_root(&audit.root_url)?;
        let frontier = Frontier::new(audit_id);

        match audit.status {
            AuditStatus::Pending => {
                frontier.seed(&mut self.storage, &root)?;
                self.storage.start_audit(audit_id)?;
                tracing::info!("Audit {} started for {}", audit_id, root);
            }
            AuditStatus::BatchComplete => {
                if !self.transition(audit_id, audit.status, AuditStatus::Crawling)? {
                    return self.finalize(audit_id, &root, true).await;
                }
            }
            AuditStatus::Checking => return self.finalize(audit_id, &root, false).await,
            AuditStatus::StopRequested => return self.finalize(audit_id, &root, true).await,
            _ => {}
        }

        let batch = self.storage.begin_batch(audit_id)?;
        let dismissals = self.load_dismissals(audit.tenant_id)?;
        tracing::info!(
            "Batch {} of audit {} started ({} dismissals)",
            batch,
            audit_id,
            dismissals.len()
        );

        let mut relaxed_tls = audit.relaxed_tls;
        let started = Instant::now();
        let mut processed = 0u32;

        let end = loop {
            if processed >= self.batch_size || started.elapsed() >= self.time_budget {
                break LoopEnd::Budget;
            }
            if self.page_cap_reached(audit_id)? {
                tracing::info!("Audit {} reached its page cap", audit_id);
                break LoopEnd::Exhausted;
            }

            if processed > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            let Some(entry) = frontier.next(&mut self.storage)? else {
                tracing::info!("Frontier of audit {} is empty", audit_id);
                break LoopEnd::Exhausted;
            };

            tracing::debug!("Processing {} (depth {})", entry.url, entry.depth);
            self.process_entry(audit_id, &root, &frontier, &entry, &dismissals, &mut relaxed_tls)
                .await?;
            processed += 1;

            let pages = self.storage.count_pages(audit_id)?;
            let discovered = frontier.discovered(&self.storage)?;
            self.storage
                .update_progress(audit_id, pages as u32, discovered as u32)?;

            if self.storage.get_audit(audit_id)?.status == AuditStatus::StopRequested {
                tracing::info!("Audit {} saw its stop request", audit_id);
                break LoopEnd::StopRequested;
            }
        };

        tracing::info!(
            "Batch {} of audit {} processed {} pages in {:.1}s",
            batch,
            audit_id,
            processed,
            started.elapsed().as_secs_f64()
        );

        match end {
            LoopEnd::Budget => {
                let more_work =
                    !frontier.is_exhausted(&self.storage)? && !self.page_cap_reached(audit_id)?;
                if !more_work {
                    return self.finalize(audit_id, &root, false).await;
                }

                if self.transition(audit_id, AuditStatus::Crawling, AuditStatus::BatchComplete)? {
                    Ok(BatchOutcome::Yielded)
                } else {
                    self.finalize(audit_id, &root, true).await
                }
            }
            LoopEnd::Exhausted => self.finalize(audit_id, &root, false).await,
            LoopEnd::StopRequested => self.finalize(audit_id, &root, true).await,
        }
    }

    /// Fetches (or probes) one claimed URL and records what came back
    async fn process_entry(
        &mut self,
        audit_id: i64,
        root: &Url,
        frontier: &Frontier,
        entry: &QueueEntry,
        dismissals: &Dismissals,
        relaxed_tls: &mut bool,
    ) -> Result<()> {
        let url = Url::parse(&entry.url)?;

        if let Some(resource_type) = classify_resource(&url).resource_type() {
            let probe = self.fetcher.probe(&entry.url, *relaxed_tls).await;
            self.note_relaxed_tls(audit_id, &probe, relaxed_tls)?;

            let last_modified = match &probe {
                FetchResult::Success { last_modified, .. } => last_modified.clone(),
                FetchResult::NetworkError { .. } => None,
            };
            self.storage.insert_page(
                audit_id,
                &NewPage {
                    url: entry.url.clone(),
                    status_code: probe.status_code(),
                    last_modified,
                    resource_type: Some(resource_type),
                    redirects: probe.redirects().to_vec(),
                    ..NewPage::default()
                },
            )?;
            tracing::debug!("Recorded {} resource {}", resource_type.to_db_string(), url);
            return Ok(());
        }

        let fetched = self.fetcher.fetch(&entry.url, *relaxed_tls).await;
        self.note_relaxed_tls(audit_id, &fetched, relaxed_tls)?;

        let (final_url, redirects, status_code, body, last_modified) = match fetched {
            FetchResult::Success {
                final_url,
                redirects,
                status_code,
                body,
                last_modified,
                ..
            } => (final_url, redirects, status_code, body, last_modified),
            FetchResult::NetworkError { error } => {
                tracing::warn!(url = %url, "Fetch failed: {}", error);
                self.storage.insert_page(
                    audit_id,
                    &NewPage {
                        url: entry.url.clone(),
                        ..NewPage::default()
                    },
                )?;
                return Ok(());
            }
        };

        let is_success = (200..300).contains(&status_code);
        let parsed = if is_success {
            let base = Url::parse(&final_url).unwrap_or_else(|_| url.clone());
            parse_html(&body, root, &base)
        } else {
            ParsedPage::default()
        };

        let page_id = self.storage.insert_page(
            audit_id,
            &NewPage {
                url: entry.url.clone(),
                title: parsed.title,
                meta_description: parsed.meta_description,
                status_code: Some(status_code),
                last_modified,
                resource_type: None,
                redirects,
            },
        )?;

        if is_success {
            if entry.depth == 0 {
                self.storage.set_homepage_html(audit_id, &body)?;
            }
            let discovered = frontier.push_links(&mut self.storage, entry.depth, &parsed.links)?;
            tracing::debug!(
                "{} links on {}, {} newly discovered",
                parsed.links.len(),
                url,
                discovered
            );
        } else {
            tracing::debug!("{} answered {}, links not followed", url, status_code);
        }

        let pages = self.storage.list_pages(audit_id)?;
        let engine = CheckEngine::new(
            dismissals,
            self.fetcher.client(*relaxed_tls),
            self.fetcher.manual_redirect_client(*relaxed_tls),
            self.aux_timeout,
        );
        let results = engine
            .run_page_checks(&url, &body, status_code, &pages)
            .await;
        self.storage
            .insert_check_results(audit_id, Some(page_id), &results)?;

        tracing::debug!("Recorded {} check results for {}", results.len(), url);
        Ok(())
    }

    /// Site-wide checks, scoring, summary and the terminal transition
    ///
    /// Site-wide checks are skipped when a previous attempt already wrote
    /// them, so finalizing twice never duplicates them.
    async fn finalize(
        &mut self,
        audit_id: i64,
        root: &Url,
        stop_requested: bool,
    ) -> Result<BatchOutcome> {
        if self.storage.count_fetched_pages(audit_id)? == 0 {
            let failure = if stop_requested {
                AuditFailure::StoppedBeforeFirstPage
            } else {
                AuditFailure::Unreachable
            };
            tracing::error!("Audit {} failed: {}", audit_id, failure);
            self.storage
                .finish_audit(audit_id, AuditStatus::Failed, Some(&failure.to_string()))?;
            return Ok(BatchOutcome::Finished(AuditStatus::Failed));
        }

        let mut stopped = stop_requested;
        if !stopped {
            let current = self.storage.get_audit(audit_id)?.status;
            stopped = current == AuditStatus::StopRequested
                || !self.transition(audit_id, current, AuditStatus::Checking)?;
        }

        if self.storage.count_site_wide_results(audit_id)? == 0 {
            self.run_site_checks(audit_id, root).await?;
        } else {
            tracing::debug!("Site-wide results of audit {} already recorded", audit_id);
        }

        let results = self.storage.list_check_results(audit_id)?;
        let scores = scoring::score(&results);
        self.storage.save_scores(audit_id, &scores)?;

        let audit = self.storage.get_audit(audit_id)?;
        let facts = AuditFacts {
            audit: &audit,
            scores: &scores,
            results: &results,
        };
        match self.summary.generate(&facts).await {
            Ok(Some(summary)) => self.storage.set_summary(audit_id, &summary)?,
            Ok(None) => {}
            Err(e) => tracing::warn!("No summary for audit {}: {}", audit_id, e),
        }

        let requested = if stopped {
            AuditStatus::Stopped
        } else {
            AuditStatus::Completed
        };
        self.storage.finish_audit(audit_id, requested, None)?;

        // Storage turns `completed` into `stopped` for a late stop request
        let status = self.storage.get_audit(audit_id)?.status;

        tracing::info!(
            "Audit {} {}: overall {} (seo {}, ai readiness {}, technical {})",
            audit_id,
            status,
            scores.overall,
            scores.seo,
            scores.ai_readiness,
            scores.technical
        );
        Ok(BatchOutcome::Finished(status))
    }

    async fn run_site_checks(&mut self, audit_id: i64, root: &Url) -> Result<()> {
        let audit = self.storage.get_audit(audit_id)?;
        let homepage_html = match audit.homepage_html {
            Some(html) => Some(html),
            None => self.refetch_homepage(audit_id, root, audit.relaxed_tls).await?,
        };

        let pages = self.storage.list_pages(audit_id)?;
        let dismissals = self.load_dismissals(audit.tenant_id)?;
        let engine = CheckEngine::new(
            &dismissals,
            self.fetcher.client(audit.relaxed_tls),
            self.fetcher.manual_redirect_client(audit.relaxed_tls),
            self.aux_timeout,
        );

        let results = engine
            .run_site_checks(root, homepage_html.as_deref(), &pages)
            .await;
        self.storage.insert_check_results(audit_id, None, &results)?;

        tracing::info!(
            "Recorded {} site-wide results for audit {}",
            results.len(),
            audit_id
        );
        Ok(())
    }

    /// Fetches the homepage again when its markup was never stored
    async fn refetch_homepage(
        &mut self,
        audit_id: i64,
        root: &Url,
        relaxed_tls: bool,
    ) -> Result<Option<String>> {
        match self.fetcher.fetch(root.as_str(), relaxed_tls).await {
            FetchResult::Success {
                status_code, body, ..
            } if (200..300).contains(&status_code) => {
                self.storage.set_homepage_html(audit_id, &body)?;
                Ok(Some(body))
            }
            _ => {
                tracing::warn!(
                    "Homepage of audit {} unavailable for site-wide checks",
                    audit_id
                );
                Ok(None)
            }
        }
    }

    /// Applies a lifecycle transition
    ///
    /// # Returns
    ///
    /// `false` when a stop request got there first
    fn transition(&mut self, audit_id: i64, from: AuditStatus, to: AuditStatus) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(AuditError::InvalidTransition { from, to });
        }

        let applied = self.storage.update_audit_status(audit_id, to)?;
        if applied {
            tracing::debug!("Audit {}: {} -> {}", audit_id, from, to);
        }
        Ok(applied)
    }

    /// Persists relaxed TLS the first time the fetcher needed it
    fn note_relaxed_tls(
        &mut self,
        audit_id: i64,
        result: &FetchResult,
        relaxed_tls: &mut bool,
    ) -> Result<()> {
        if result.used_relaxed_tls() && !*relaxed_tls {
            self.storage.set_relaxed_tls(audit_id)?;
            *relaxed_tls = true;
            tracing::info!("Audit {} continues with relaxed TLS", audit_id);
        }
        Ok(())
    }

    fn load_dismissals(&self, tenant_id: Option<i64>) -> Result<Dismissals> {
        Ok(match tenant_id {
            Some(tenant) => Dismissals::new(&self.storage.list_dismissals(tenant)?),
            None => Dismissals::default(),
        })
    }

    fn page_cap_reached(&self, audit_id: i64) -> Result<bool> {
        match self.max_pages {
            Some(max) => Ok(self.storage.count_pages(audit_id)? >= u64::from(max)),
            None => Ok(false),
        }
    }
}
