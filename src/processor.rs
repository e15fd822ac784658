//! End-to-end run: purchase history (cached or scraped), playtime fetch
//! with one token refresh, then the spreadsheet report.

use crate::clients::steam::{PlaytimeTable, SteamClient};
use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::report;
use crate::scrapers::history;
use crate::scrapers::wizard::{PurchaseRecord, WizardResolver};
use crate::session;
use crate::store::CredentialStore;
use indicatif::ProgressBar;
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

pub struct Processor {
    config: Config,
    store: CredentialStore,
    steam: SteamClient,
}

impl Processor {
    pub fn new(config: Config) -> Self {
        let store = CredentialStore::new(&config.args.cookie_store);
        let steam = SteamClient::new(config.http_client.clone());
        Self {
            config,
            store,
            steam,
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Step 1: Getting purchase history...");
        let records = self.load_history().await?;

        info!("Step 2: Getting playtime data...");
        let playtime = self.fetch_playtime().await?;

        info!("Step 3: Writing report...");
        report::write_report(&records, &playtime, &self.config.args.output)?;
        info!(
            "Overall hours per dollar: {:.2}",
            report::overall_hours_per_dollar(&records, &playtime)
        );
        Ok(())
    }

    /// Use the cached history when present; otherwise scrape and cache it.
    /// The cache has no staleness check, only `--skip-cache` bypasses it.
    async fn load_history(&self) -> Result<Vec<PurchaseRecord>> {
        let cache_path = &self.config.args.history_cache;
        if !self.config.args.skip_cache {
            if let Some(records) = read_cached_history(cache_path)? {
                info!(
                    "Loaded {} cached purchases from {}",
                    records.len(),
                    cache_path.display()
                );
                return Ok(records);
            }
        }

        let records = self.scrape_history().await?;
        std::fs::write(cache_path, serde_json::to_string_pretty(&records)?)?;
        info!("Cached purchase history to {}", cache_path.display());
        Ok(records)
    }

    async fn scrape_history(&self) -> Result<Vec<PurchaseRecord>> {
        let browser = session::bootstrap(&self.config, &self.store).await?;
        let transactions = history::list_transactions(browser.client()).await?;

        let creds = self.store.load()?;
        let resolver = WizardResolver::new(self.config.http_client.clone(), &creds);

        let bar = ProgressBar::new(transactions.len() as u64);
        let mut records = Vec::new();
        let mut failed = 0usize;
        for transaction_id in &transactions {
            let outcome = resolver.resolve(transaction_id).await;
            if let Some(error) = outcome.error {
                warn!("Transaction {transaction_id} aborted: {error}");
                failed += 1;
            }
            records.extend(outcome.records);
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "Scraped {} purchases from {} transactions ({failed} failed)",
            records.len(),
            transactions.len()
        );
        // The records are not cached yet at this point; a shutdown
        // failure must not throw them away.
        if let Err(error) = browser.close().await {
            warn!("Browser shutdown failed, keeping scraped records: {error}");
        }
        Ok(records)
    }

    /// Call the playtime API with the stored token. The first failure
    /// triggers one session re-bootstrap to refresh the token; a second
    /// consecutive failure is fatal.
    async fn fetch_playtime(&self) -> Result<PlaytimeTable> {
        let store = &self.store;
        let steam = &self.steam;
        let config = &self.config;
        fetch_with_refresh(
            || async move {
                let creds = store.load()?;
                steam.owned_games(&creds).await
            },
            || async move {
                let browser = session::bootstrap(config, store).await?;
                browser.close().await
            },
        )
        .await
    }
}

/// Retry policy for the playtime call: run `fetch`; on the first failure
/// run `refresh` once and try again; a second consecutive failure is
/// fatal. A `refresh` failure is fatal in its own right.
async fn fetch_with_refresh<T, F, FFut, R, RFut>(mut fetch: F, mut refresh: R) -> Result<T>
where
    F: FnMut() -> FFut,
    FFut: Future<Output = Result<T>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = Result<()>>,
{
    let mut failures = 0u32;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                failures += 1;
                if failures >= 2 {
                    return Err(ReportError::RetriesExhausted(error.to_string()));
                }
                warn!("Playtime API call failed, refreshing session: {error}");
                refresh().await?;
            }
        }
    }
}

fn read_cached_history(path: &Path) -> Result<Option<Vec<PurchaseRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn successful_fetch_never_refreshes() {
        let refreshes = &AtomicU32::new(0);
        let result = fetch_with_refresh(
            || async move { Ok(42u32) },
            || async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failure_refreshes_once_then_succeeds() {
        let fetches = &AtomicU32::new(0);
        let refreshes = &AtomicU32::new(0);
        let result = fetch_with_refresh(
            || async move {
                if fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ReportError::Parse("expired token".to_string()))
                } else {
                    Ok(42u32)
                }
            },
            || async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_consecutive_failure_is_fatal() {
        let fetches = &AtomicU32::new(0);
        let refreshes = &AtomicU32::new(0);
        let result: Result<u32> = fetch_with_refresh(
            || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Err(ReportError::Parse("expired token".to_string()))
            },
            || async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(ReportError::RetriesExhausted(_))));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_cache_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_cached_history(&dir.path().join("purchase_history.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn cache_round_trips_through_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchase_history.json");
        let records = vec![PurchaseRecord {
            primary_name: "Portal 2".to_string(),
            value: "$5.00".to_string(),
            purchase_date: "Jan 5, 2020".to_string(),
            transaction_id: "555".to_string(),
            appids: "200".to_string(),
            is_gift: true,
            info_tags: "DLC".to_string(),
        }];
        std::fs::write(&path, serde_json::to_string_pretty(&records).unwrap()).unwrap();
        assert_eq!(read_cached_history(&path).unwrap().unwrap(), records);
    }

    #[test]
    fn malformed_cache_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchase_history.json");
        std::fs::write(&path, "[{broken").unwrap();
        assert!(read_cached_history(&path).is_err());
    }
}
