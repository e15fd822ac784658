//! Transaction lister: pages the account-history table to exhaustion in
//! the live browser and pulls transaction ids out of the row markup.

use crate::error::Result;
use fantoccini::{Client, Locator};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOAD_MORE_ID: &str = "load_more_button";
const ROW_SELECTOR: &str = ".wallet_table_row";

/// Rows whose click handler goes to the community market history carry no
/// transaction id; they are market activity, not purchases.
const MARKET_HISTORY_HANDLER: &str =
    "location.href='https://steamcommunity.com/market/#myhistory'";

static TRANSID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"transid=([0-9]+)").unwrap());

#[derive(Debug, PartialEq, Eq)]
pub enum RowKind {
    Purchase(String),
    Market,
    Unrecognized,
}

pub fn classify_row(onclick: Option<&str>) -> RowKind {
    let Some(onclick) = onclick else {
        return RowKind::Unrecognized;
    };
    if onclick == MARKET_HISTORY_HANDLER {
        return RowKind::Market;
    }
    match TRANSID_RE.captures(onclick) {
        Some(caps) => RowKind::Purchase(caps[1].to_string()),
        None => RowKind::Unrecognized,
    }
}

/// Return every purchase transaction id currently reachable from the
/// account-history page, in rendered order.
pub async fn list_transactions(client: &Client) -> Result<Vec<String>> {
    load_all_pages(client).await?;

    let rows = client.find_all(Locator::Css(ROW_SELECTOR)).await?;
    let mut transactions = Vec::new();
    let mut market = 0usize;
    let mut skipped = 0usize;

    for row in rows {
        let onclick = match row.attr("onclick").await {
            Ok(attr) => attr,
            Err(e) => {
                warn!("Could not read row handler, skipping row: {e}");
                skipped += 1;
                continue;
            }
        };
        match classify_row(onclick.as_deref()) {
            RowKind::Purchase(id) => transactions.push(id),
            RowKind::Market => market += 1,
            RowKind::Unrecognized => {
                warn!("Skipping row with unrecognized handler: {onclick:?}");
                skipped += 1;
            }
        }
    }

    info!(
        "Found {} purchase transactions ({market} market rows, {skipped} unreadable rows skipped)",
        transactions.len()
    );
    Ok(transactions)
}

/// Click "load more" until it stops being reachable within the wait
/// window. That is the only termination condition: a slow page load and
/// the end of the history look the same here, and both just stop the loop.
async fn load_all_pages(client: &Client) -> Result<()> {
    loop {
        let button = match client
            .wait()
            .at_most(Duration::from_secs(4))
            .for_element(Locator::Id(LOAD_MORE_ID))
            .await
        {
            Ok(button) => button,
            Err(e) => {
                debug!("Load-more button no longer reachable: {e}");
                break;
            }
        };
        if let Err(e) = button.click().await {
            debug!("Load-more button no longer clickable: {e}");
            break;
        }
        client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
    }
    info!("Loaded all transaction pages");
    Ok(())
}
