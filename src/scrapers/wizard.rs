//! Purchase detail resolver: reconstructs line-item purchase records for
//! one transaction from the storefront's "help wizard" pages.
//!
//! Two rounds of fetch-and-parse per transaction: the transaction wizard
//! page lists one anchor per line item, and each line item's detail page
//! carries the name, price, date and product links.

use crate::error::{ReportError, Result};
use crate::store::Credentials;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::COOKIE;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::future::Future;

const HELP_BASE_URL: &str = "https://help.steampowered.com";
const DATE_PREFIX: &str = "Purchased: ";

static LINE_ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/en/wizard/HelpWithMyPurchase']").unwrap());
static GIFT_ICON_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src*='icon_gift.png']").unwrap());
static GAME_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/en/wizard/HelpWithGame/']").unwrap());
static TAG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[class*='button']").unwrap());
static NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".purchase_detail_field").unwrap());
static VALUE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".refund_value").unwrap());
static DATE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".purchase_date").unwrap());

static APPID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]appid=([0-9]+)").unwrap());

/// One line item of one transaction, as later written to the history
/// cache and the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub primary_name: String,
    /// Currency-formatted price string, e.g. `$10.99`.
    pub value: String,
    pub purchase_date: String,
    pub transaction_id: String,
    /// Comma-joined product ids covered by this line item.
    pub appids: String,
    pub is_gift: bool,
    /// Comma-joined free-form tags scraped off the product links.
    #[serde(default)]
    pub info_tags: String,
}

/// Result of resolving one transaction. Records parsed before a failure
/// are kept; the error, if any, covers the rest of the transaction.
#[derive(Debug)]
pub struct TransactionOutcome {
    pub records: Vec<PurchaseRecord>,
    pub error: Option<ReportError>,
}

#[derive(Debug, PartialEq)]
struct LineItemRef {
    url: String,
    is_gift: bool,
}

pub struct WizardResolver {
    client: reqwest::Client,
    cookie_header: String,
}

impl WizardResolver {
    pub fn new(client: reqwest::Client, creds: &Credentials) -> Self {
        Self {
            client,
            cookie_header: creds.cookie_header(),
        }
    }

    /// Resolve one transaction into zero or more purchase records. Never
    /// fails outright: a fetch or parse error ends this transaction's
    /// processing but keeps whatever was already parsed.
    pub async fn resolve(&self, transaction_id: &str) -> TransactionOutcome {
        resolve_with(transaction_id, |url| self.fetch(url)).await
    }

    async fn fetch(&self, url: String) -> Result<String> {
        let response = self
            .client
            .get(&url)
            .header(COOKIE, &self.cookie_header)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Walk one transaction's wizard pages through `fetch`. Records parsed
/// before the first failure stay in the outcome; the failure ends the
/// rest of the transaction.
async fn resolve_with<F, Fut>(transaction_id: &str, mut fetch: F) -> TransactionOutcome
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut records = Vec::new();

    let walk = async {
        let wizard_url =
            format!("{HELP_BASE_URL}/en/wizard/HelpWithTransaction?transid={transaction_id}");
        let wizard_html = fetch(wizard_url).await?;

        for line_item in parse_line_items(&wizard_html) {
            let detail_html = fetch(line_item.url).await?;
            records.push(parse_detail_page(
                &detail_html,
                transaction_id,
                line_item.is_gift,
            )?);
        }
        Ok(())
    };
    let error = walk.await.err();

    TransactionOutcome { records, error }
}

/// Extract the per-line-item detail links (and their gift markers) from a
/// transaction wizard page.
fn parse_line_items(html: &str) -> Vec<LineItemRef> {
    let document = Html::parse_document(html);
    document
        .select(&LINE_ITEM_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            Some(LineItemRef {
                url: absolutize(href),
                is_gift: anchor.select(&GIFT_ICON_SELECTOR).next().is_some(),
            })
        })
        .collect()
}

/// Build one purchase record from a line-item detail page.
fn parse_detail_page(html: &str, transaction_id: &str, is_gift: bool) -> Result<PurchaseRecord> {
    let document = Html::parse_document(html);

    let mut appids = Vec::new();
    let mut info_tags = Vec::new();
    for anchor in document.select(&GAME_LINK_SELECTOR) {
        if let Some(appid) = anchor
            .value()
            .attr("href")
            .and_then(appid_from_href)
        {
            appids.push(appid);
        }
        for tag in anchor.select(&TAG_SELECTOR) {
            let text = element_text(&tag);
            if !text.is_empty() {
                info_tags.push(text);
            }
        }
    }

    let primary_name = required_field(&document, &NAME_SELECTOR, "purchase_detail_field")?;
    let value = required_field(&document, &VALUE_SELECTOR, "refund_value")?;
    let purchase_date = required_field(&document, &DATE_SELECTOR, "purchase_date")?
        .trim_start_matches(DATE_PREFIX)
        .to_string();

    Ok(PurchaseRecord {
        primary_name,
        value,
        purchase_date,
        transaction_id: transaction_id.to_string(),
        appids: appids.join(","),
        is_gift,
        info_tags: info_tags.join(","),
    })
}

fn required_field(document: &Html, selector: &Selector, name: &str) -> Result<String> {
    document
        .select(selector)
        .next()
        .map(|el| element_text(&el))
        .ok_or_else(|| ReportError::Parse(format!("missing .{name} on detail page")))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn appid_from_href(href: &str) -> Option<String> {
    APPID_RE.captures(href).map(|caps| caps[1].to_string())
}

fn absolutize(href: &str) -> String {
    if href.starts_with('/') {
        format!("{HELP_BASE_URL}{href}")
    } else {
        href.to_string()
    }
}
