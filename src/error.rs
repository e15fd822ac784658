use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("WebDriver error: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),
    #[error("WebDriver session error: {0}")]
    NewSession(#[from] fantoccini::error::NewSessionError),
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No access_token entry found in the page's network log")]
    TokenMissing,
    #[error("Timed out after {0}s waiting for login; log in to Steam in the browser window and re-run")]
    LoginTimeout(u64),
    #[error("Playtime API still failing after a session refresh: {0}")]
    RetriesExhausted(String),
    #[error("Could not save report to {path}: {source}. Close the file if it is open in another program")]
    ReportSave {
        path: String,
        source: rust_xlsxwriter::XlsxError,
    },
}

pub type Result<T> = std::result::Result<T, ReportError>;
